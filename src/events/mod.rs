//! # Lifecycle Events
//!
//! Broadcast of scheduler lifecycle events for observers such as progress
//! monitors. Publishing never fails for lack of subscribers.

pub mod publisher;

pub use publisher::{EventPublisher, PublishError, PublishedEvent};
