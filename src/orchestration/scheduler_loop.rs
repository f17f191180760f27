//! # Scheduler Loop
//!
//! The polling control loop the external executor invokes on its own
//! schedule. Each invocation:
//!
//! 1. asks the [`InputWatcher`] for new items, plans units for them and makes
//!    the join unit wait on those units as well
//! 2. scans the tracked items for fresh completion and failure markers
//! 3. merges the newly done items into the output
//! 4. once the input is closed and every tracked item is done or failed,
//!    publishes the output as closed and releases the join unit
//!
//! All per-run state lives in a [`JobContext`] the caller owns and passes to
//! every call; the loop itself only holds collaborators.

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::config::SchedulerConfig;
use crate::constants::{events, StreamState, JOIN_STEP_NAME, OUTPUT_NAME};
use crate::error::{SchedulerError, SchedulerResult};
use crate::events::EventPublisher;
use crate::ledger::CompletionLedger;
use crate::logging::log_unit_operation;
use crate::models::{
    InputItem, OutputCollection, RecalculationRequest, TrackedSet, UnitId, WorkUnit,
};
use crate::orchestration::estimator::{EstimationParams, Estimator};
use crate::orchestration::executor::{StepExecutor, StepRequest};
use crate::orchestration::finalizer::{OutputFinalizer, RunSummary};
use crate::orchestration::input_watcher::{InputCheck, InputSource, InputWatcher};
use crate::orchestration::output_aggregator::{OutputAggregator, OutputPublisher};
use crate::orchestration::recalculation_planner::{RecalculationPlan, RecalculationPlanner};
use crate::orchestration::work_unit_planner::WorkUnitPlanner;
use crate::state_machine::{SchedulerState, StepStatus};

/// Which path a run follows
#[derive(Debug, Clone)]
pub enum RunMode {
    /// Open-ended input stream
    Streaming,
    /// One-shot re-estimation of flagged items from a prior run's output
    Recalculation {
        requests: Vec<RecalculationRequest>,
        prior_output: String,
    },
}

/// Per-run scheduler state, created at job start and dropped at job end
#[derive(Debug)]
pub struct JobContext {
    run_id: Uuid,
    mode: RunMode,
    tracked: TrackedSet,
    watcher: InputWatcher,
    state: SchedulerState,
    stream_closed: bool,
    output: Option<OutputCollection>,
    join_unit: Option<UnitId>,
    params: Option<EstimationParams>,
    recalculation: Option<RecalculationPlan>,
}

impl JobContext {
    pub fn streaming() -> Self {
        Self::with_mode(RunMode::Streaming)
    }

    pub fn recalculation(requests: Vec<RecalculationRequest>, prior_output: impl Into<String>) -> Self {
        Self::with_mode(RunMode::Recalculation {
            requests,
            prior_output: prior_output.into(),
        })
    }

    fn with_mode(mode: RunMode) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            mode,
            tracked: TrackedSet::new(),
            watcher: InputWatcher::new(),
            state: SchedulerState::Running,
            stream_closed: false,
            output: None,
            join_unit: None,
            params: None,
            recalculation: None,
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn mode(&self) -> &RunMode {
        &self.mode
    }

    pub fn is_recalculation(&self) -> bool {
        matches!(self.mode, RunMode::Recalculation { .. })
    }

    pub fn tracked(&self) -> &TrackedSet {
        &self.tracked
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn is_finished(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn stream_closed(&self) -> bool {
        self.stream_closed
    }

    pub fn output(&self) -> Option<&OutputCollection> {
        self.output.as_ref()
    }

    pub fn join_unit(&self) -> Option<UnitId> {
        self.join_unit
    }

    pub fn params(&self) -> Option<&EstimationParams> {
        self.params.as_ref()
    }

    pub fn recalculation_plan(&self) -> Option<&RecalculationPlan> {
        self.recalculation.as_ref()
    }

    /// Items a unit body may look up: tracked items when streaming, planned
    /// items when recalculating
    pub fn item_lookup(&self) -> &TrackedSet {
        match &self.recalculation {
            Some(plan) => &plan.items,
            None => &self.tracked,
        }
    }
}

/// What a poll did, doubling as a scheduling hint for the executor
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// Run already finished, or the run does not stream
    Skipped,
    /// No new completions; items are still pending
    Idle,
    /// Every tracked item is accounted for but the input is still open; wait
    /// before polling again
    Backoff(Duration),
    Progress { appended: usize, failed: usize },
    Finished { appended: usize, failed: usize },
}

pub struct SchedulerLoop {
    config: SchedulerConfig,
    ledger: CompletionLedger,
    source: Arc<dyn InputSource>,
    executor: Arc<dyn StepExecutor>,
    aggregator: OutputAggregator,
    finalizer: OutputFinalizer,
    events: EventPublisher,
}

impl std::fmt::Debug for SchedulerLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchedulerLoop")
            .field("config", &self.config)
            .field("source", &self.source.name())
            .field("aggregator", &self.aggregator)
            .finish_non_exhaustive()
    }
}

impl SchedulerLoop {
    pub fn new(
        config: SchedulerConfig,
        ledger: CompletionLedger,
        source: Arc<dyn InputSource>,
        executor: Arc<dyn StepExecutor>,
        estimator: Arc<dyn Estimator>,
        publisher: Arc<dyn OutputPublisher>,
    ) -> Self {
        let aggregator = OutputAggregator::new(
            OUTPUT_NAME,
            source.name(),
            Arc::clone(&estimator),
            Arc::clone(&publisher),
        );
        let finalizer = OutputFinalizer::new(OUTPUT_NAME, estimator, publisher);
        Self {
            config,
            ledger,
            source,
            executor,
            aggregator,
            finalizer,
            events: EventPublisher::default(),
        }
    }

    /// Create with a custom event publisher
    pub fn with_event_publisher(mut self, events: EventPublisher) -> Self {
        self.events = events;
        self
    }

    pub fn events(&self) -> &EventPublisher {
        &self.events
    }

    pub fn ledger(&self) -> &CompletionLedger {
        &self.ledger
    }

    /// Insert the initial units and the join unit for a run
    #[instrument(skip_all, fields(run_id = %ctx.run_id))]
    pub async fn initialize(&self, ctx: &mut JobContext) -> SchedulerResult<()> {
        if ctx.join_unit.is_some() {
            return Err(SchedulerError::InvalidState(format!(
                "Run {} is already initialized",
                ctx.run_id
            )));
        }
        self.ledger.initialize().await?;

        let (unit_ids, wait) = match ctx.mode.clone() {
            RunMode::Streaming => {
                let unit_ids = self.check_new_input(ctx).await?;
                (unit_ids, true)
            }
            RunMode::Recalculation { requests, .. } => {
                let snapshot = self.source.open().await?;
                let mut lookup = TrackedSet::new();
                for item in snapshot.items {
                    lookup.insert(Arc::new(item));
                }
                let plan = RecalculationPlanner::new(self.config.estimation.clone())
                    .plan(&lookup, requests)?;
                let unit_ids = self.insert_units(&plan.units).await?;
                ctx.recalculation = Some(plan);
                // Recalculation never streams
                (unit_ids, false)
            }
        };

        let join = self
            .executor
            .insert_work_unit(StepRequest::join(JOIN_STEP_NAME, unit_ids.clone(), wait))
            .await?;
        ctx.join_unit = Some(join);
        log_unit_operation(
            "insert_join",
            Some(join),
            JOIN_STEP_NAME,
            unit_ids.len(),
            if wait { "waiting" } else { "new" },
            None,
        );
        Ok(())
    }

    /// Entry point the executor calls on its own schedule
    #[instrument(skip_all, fields(run_id = %ctx.run_id, tracked = ctx.tracked.len()))]
    pub async fn steps_check(&self, ctx: &mut JobContext) -> SchedulerResult<PollOutcome> {
        if ctx.is_recalculation() || ctx.is_finished() {
            return Ok(PollOutcome::Skipped);
        }
        self.check_new_input(ctx).await?;
        self.check_new_output(ctx).await
    }

    /// Body of the join unit
    pub async fn finalize(&self, ctx: &JobContext) -> SchedulerResult<RunSummary> {
        match &ctx.mode {
            RunMode::Streaming => self.finalizer.finalize_streaming(ctx.output(), ctx.tracked.len()),
            RunMode::Recalculation { prior_output, .. } => {
                let plan = ctx.recalculation.as_ref().ok_or_else(|| {
                    SchedulerError::InvalidState(format!(
                        "Run {} finalized before it was initialized",
                        ctx.run_id
                    ))
                })?;
                self.finalizer
                    .finalize_recalculation(prior_output, plan)
                    .await
            }
        }
    }

    async fn check_new_input(&self, ctx: &mut JobContext) -> SchedulerResult<Vec<UnitId>> {
        let check = ctx
            .watcher
            .check_for_new_items(self.source.as_ref(), &ctx.tracked)
            .await?;

        let InputCheck::Loaded {
            new_items,
            stream_closed,
            properties,
        } = check
        else {
            return Ok(Vec::new());
        };

        // Closing is final even if the source later reports otherwise
        ctx.stream_closed |= stream_closed;
        let params = ctx
            .params
            .get_or_insert_with(|| {
                EstimationParams::from_collection(&properties, &self.config.estimation)
            })
            .clone();

        if new_items.is_empty() {
            return Ok(Vec::new());
        }

        let unit_ids = self.track_and_insert(ctx, new_items, &params).await?;

        if let Some(join) = self.executor.get_step_by_name(JOIN_STEP_NAME).await? {
            self.executor.add_prerequisites(join.id, &unit_ids).await?;
        }
        Ok(unit_ids)
    }

    async fn track_and_insert(
        &self,
        ctx: &mut JobContext,
        new_items: Vec<Arc<InputItem>>,
        params: &EstimationParams,
    ) -> SchedulerResult<Vec<UnitId>> {
        for item in &new_items {
            ctx.tracked.insert(Arc::clone(item));
        }

        let units = WorkUnitPlanner::new(self.config.streaming.batch_size)
            .with_args(serde_json::to_value(params)?)
            .plan_units(&new_items);
        let unit_ids = self.insert_units(&units).await?;

        self.events.publish(
            events::UNITS_INSERTED,
            json!({
                "run_id": ctx.run_id,
                "items": new_items.len(),
                "units": unit_ids,
            }),
        );
        Ok(unit_ids)
    }

    async fn insert_units(&self, units: &[WorkUnit]) -> SchedulerResult<Vec<UnitId>> {
        let mut unit_ids = Vec::with_capacity(units.len());
        for unit in units {
            let unit_id = self
                .executor
                .insert_work_unit(StepRequest::from_work_unit(unit))
                .await?;
            log_unit_operation("insert", Some(unit_id), unit.step_name(), unit.len(), "new", None);
            unit_ids.push(unit_id);
        }
        Ok(unit_ids)
    }

    async fn check_new_output(&self, ctx: &mut JobContext) -> SchedulerResult<PollOutcome> {
        if ctx.is_finished() {
            return Ok(PollOutcome::Skipped);
        }

        let done_ids = self.ledger.load_done_ids().await?;
        let failed_ids = self.ledger.load_failed_ids().await?;

        let mut done_count = 0;
        let mut failed_count = 0;
        let mut new_done = Vec::new();
        let mut new_failed = Vec::new();
        for item in ctx.tracked.iter() {
            if done_ids.contains(&item.id) {
                done_count += 1;
            } else if failed_ids.contains(&item.id) {
                failed_count += 1;
            } else if self.ledger.is_done(item.id).await? {
                new_done.push(Arc::clone(item));
            } else if self.ledger.is_marked_failed(item.id).await? {
                new_failed.push(item.id);
            }
        }

        let tracked = ctx.tracked.len();
        let all_accounted = done_count + failed_count + new_done.len() + new_failed.len();
        let finished = ctx.stream_closed && all_accounted == tracked;
        let stream_state = StreamState::from_closed(finished);

        debug!(
            tracked,
            done = done_count,
            failed = failed_count,
            new_done = new_done.len(),
            new_failed = new_failed.len(),
            stream_state = %stream_state,
            "Checked for new output"
        );

        // Units leave per-item failure markers; only this loop appends them
        if !new_failed.is_empty() {
            self.ledger.mark_failed(&new_failed).await?;
        }

        let (appended, failed) = if !new_done.is_empty() {
            let outcome = self
                .aggregator
                .reconcile(&mut ctx.output, &new_done, stream_state)
                .await?;
            let appended_ids: Vec<_> = outcome.appended.iter().map(|i| i.id).collect();
            let done_failed: Vec<_> = outcome.done_failed.iter().map(|i| i.id).collect();
            if !appended_ids.is_empty() {
                self.ledger.record_done(&appended_ids).await?;
            }
            if !done_failed.is_empty() {
                self.ledger.mark_failed(&done_failed).await?;
            }

            let mut failed_ids = new_failed;
            failed_ids.extend(done_failed);
            self.events.publish(
                events::OUTPUT_UPDATED,
                json!({
                    "run_id": ctx.run_id,
                    "appended": appended_ids,
                    "failed": failed_ids,
                    "stream_state": stream_state,
                }),
            );
            (appended_ids.len(), failed_ids.len())
        } else if !finished && new_failed.is_empty() {
            if all_accounted == tracked {
                return Ok(PollOutcome::Backoff(self.config.streaming.idle_backoff()));
            }
            return Ok(PollOutcome::Idle);
        } else {
            (0, new_failed.len())
        };

        if !finished {
            return Ok(PollOutcome::Progress { appended, failed });
        }

        ctx.state = SchedulerState::Finished;
        let closed_published = ctx
            .output
            .as_ref()
            .is_some_and(|output| output.stream_state().is_closed());
        if !closed_published {
            self.aggregator
                .publish_stream_state(&mut ctx.output, StreamState::Closed)
                .await?;
        }
        self.release_join_unit().await?;

        info!(
            tracked,
            done = done_count + appended,
            failed = failed_count + failed,
            "All tracked items accounted for, stream closed"
        );
        self.events.publish(
            events::FINISHED,
            json!({
                "run_id": ctx.run_id,
                "tracked": tracked,
                "output_size": ctx.output.as_ref().map_or(0, OutputCollection::len),
            }),
        );
        Ok(PollOutcome::Finished { appended, failed })
    }

    async fn release_join_unit(&self) -> SchedulerResult<()> {
        if let Some(step) = self.executor.get_step_by_name(JOIN_STEP_NAME).await? {
            if step.is_waiting() {
                self.executor.set_status(step.id, StepStatus::Ready).await?;
                log_unit_operation("release", Some(step.id), JOIN_STEP_NAME, 0, "ready", None);
            }
        }
        Ok(())
    }
}
