//! # State Definitions
//!
//! States of a scheduler run and of the units the external executor tracks on
//! its behalf.

pub mod states;

pub use states::{SchedulerState, StepStatus};
