//! # Orchestration
//!
//! The scheduling core: discovering new input, planning work units, watching
//! completion markers, aggregating output, and finalizing a run.
//!
//! ## Components
//!
//! - [`InputWatcher`]: detects items appended to the input since the last check
//! - [`WorkUnitPlanner`]: groups new items into estimation units
//! - [`RecalculationPlanner`]: plans one-shot re-estimation of flagged items
//! - [`OutputAggregator`]: merges newly done items into the published output
//! - [`SchedulerLoop`]: the poll-driven control loop tying these together
//! - [`UnitRunner`]: unit bodies run by the external executor
//! - [`OutputFinalizer`]: the join unit body
//!
//! The executor, estimator, input source and output store are traits with
//! in-memory implementations, so a full run can be driven without any
//! external system.

pub mod estimator;
pub mod executor;
pub mod finalizer;
pub mod input_watcher;
pub mod output_aggregator;
pub mod recalculation_planner;
pub mod scheduler_loop;
pub mod unit_runner;
pub mod work_unit_planner;

pub use estimator::{EstimationParams, Estimator};
pub use executor::{InMemoryStepExecutor, StepExecutor, StepHandle, StepRecord, StepRequest};
pub use finalizer::{OutputFinalizer, RunSummary};
pub use input_watcher::{
    InMemoryInputSource, InputCheck, InputSnapshot, InputSource, InputWatcher,
    JsonFileInputSource,
};
pub use output_aggregator::{
    InMemoryOutputStore, OutputAggregator, OutputPublisher, PublicationRecord, ReconcileOutcome,
};
pub use recalculation_planner::{ReEstimateArgs, RecalculationPlan, RecalculationPlanner};
pub use scheduler_loop::{JobContext, PollOutcome, RunMode, SchedulerLoop};
pub use unit_runner::{UnitReport, UnitRunner};
pub use work_unit_planner::WorkUnitPlanner;
