#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Estimation Stream Core
//!
//! Incremental step scheduling for per-item estimation over a growing input
//! collection.
//!
//! ## Overview
//!
//! Items are appended to an input collection while a run is already going. The
//! scheduler periodically notices new items, plans estimation units for them,
//! watches per-item completion markers, merges finished results into an output
//! collection that is republished after each change, and finally closes the
//! output once the input is closed and every tracked item is done or failed.
//!
//! The actual execution of units is left to an external executor; the
//! scheduler talks to it through [`orchestration::StepExecutor`] and learns
//! about finished work only from the [`ledger::CompletionLedger`].
//!
//! ## Module Organization
//!
//! - [`orchestration`] - Input watching, planning, aggregation and the scheduler loop
//! - [`ledger`] - Durable done/failed records and per-item markers
//! - [`models`] - Input items, work units, result records and output collections
//! - [`state_machine`] - Scheduler and unit states
//! - [`config`] - Layered configuration
//! - [`events`] - Lifecycle event broadcast
//! - [`logging`] - Structured logging setup
//! - [`error`] - Structured error handling
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use estimation_core::config::SchedulerConfig;
//! use estimation_core::ledger::CompletionLedger;
//! use estimation_core::orchestration::{
//!     Estimator, InMemoryInputSource, InMemoryOutputStore, InMemoryStepExecutor, JobContext,
//!     PollOutcome, SchedulerLoop,
//! };
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn example(estimator: Arc<dyn Estimator>) -> Result<(), Box<dyn std::error::Error>> {
//! let source = Arc::new(InMemoryInputSource::new("input_items"));
//! let scheduler = SchedulerLoop::new(
//!     SchedulerConfig::default(),
//!     CompletionLedger::in_memory(),
//!     source,
//!     Arc::new(InMemoryStepExecutor::new()),
//!     estimator,
//!     Arc::new(InMemoryOutputStore::new()),
//! );
//!
//! let mut ctx = JobContext::streaming();
//! scheduler.initialize(&mut ctx).await?;
//! while !ctx.is_finished() {
//!     match scheduler.steps_check(&mut ctx).await? {
//!         PollOutcome::Backoff(delay) => tokio::time::sleep(delay).await,
//!         PollOutcome::Idle => tokio::time::sleep(Duration::from_millis(100)).await,
//!         _ => {}
//!     }
//! }
//! let summary = scheduler.finalize(&ctx).await?;
//! println!("{}", summary.summary);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod constants;
pub mod error;
pub mod events;
pub mod ledger;
pub mod logging;
pub mod models;
pub mod orchestration;
pub mod state_machine;

pub use config::{ConfigManager, SchedulerConfig};
pub use constants::StreamState;
pub use error::{
    EstimationError, EstimationResult, LedgerError, LedgerResult, SchedulerError, SchedulerResult,
};
pub use ledger::CompletionLedger;
pub use orchestration::{JobContext, PollOutcome, RunSummary, SchedulerLoop};
