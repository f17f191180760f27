//! Shared fixtures for the integration tests: a programmable estimator and a
//! harness that plays the external executor.

#![allow(dead_code)] // Not every test binary uses every fixture

pub mod strategies;

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use estimation_core::config::SchedulerConfig;
use estimation_core::constants::JOIN_STEP_NAME;
use estimation_core::error::{EstimationError, EstimationResult, SchedulerResult};
use estimation_core::ledger::CompletionLedger;
use estimation_core::models::{InputItem, ItemId, ResultRecord};
use estimation_core::orchestration::{
    EstimationParams, Estimator, InMemoryInputSource, InMemoryOutputStore, InMemoryStepExecutor,
    JobContext, PollOutcome, SchedulerLoop, StepExecutor, UnitReport, UnitRunner,
};
use estimation_core::state_machine::StepStatus;

pub fn item(id: ItemId) -> InputItem {
    InputItem::new(id, format!("mic_{id}"), format!("/data/mic_{id}.mrc"))
}

/// Deterministic defocus pair for an item, in Å
pub fn defocus_for(id: ItemId) -> (f64, f64) {
    let u = 10000.0 + id as f64 * 100.0;
    (u, u + 500.0)
}

/// Estimator double. Estimation is a no-op unless the item is set to fail;
/// synthesis derives the result from the item id, or from the annotation of a
/// re-estimation.
#[derive(Default)]
pub struct FakeEstimator {
    failing_estimation: Mutex<HashSet<ItemId>>,
    failing_synthesis: Mutex<HashSet<ItemId>>,
    estimated: Mutex<Vec<ItemId>>,
    re_estimated: Mutex<HashMap<ItemId, String>>,
}

impl FakeEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_estimation_of(&self, id: ItemId) {
        self.failing_estimation.lock().insert(id);
    }

    pub fn fail_synthesis_of(&self, id: ItemId) {
        self.failing_synthesis.lock().insert(id);
    }

    pub fn estimated(&self) -> Vec<ItemId> {
        self.estimated.lock().clone()
    }

    pub fn re_estimated(&self) -> HashMap<ItemId, String> {
        self.re_estimated.lock().clone()
    }
}

#[async_trait]
impl Estimator for FakeEstimator {
    async fn estimate_one(&self, item: &InputItem, _: &EstimationParams) -> EstimationResult<()> {
        if self.failing_estimation.lock().contains(&item.id) {
            return Err(EstimationError::EstimationFailed {
                item_id: item.id,
                reason: "no Thon rings".to_string(),
            });
        }
        self.estimated.lock().push(item.id);
        Ok(())
    }

    async fn re_estimate(
        &self,
        item: &InputItem,
        annotation: &str,
        _: &EstimationParams,
    ) -> EstimationResult<()> {
        self.re_estimated
            .lock()
            .insert(item.id, annotation.to_string());
        Ok(())
    }

    async fn synthesize_result(&self, item: &InputItem) -> EstimationResult<ResultRecord> {
        if self.failing_synthesis.lock().contains(&item.id) {
            return Err(EstimationError::SynthesisFailed {
                item_id: item.id,
                reason: "missing output file".to_string(),
            });
        }

        // A re-estimation annotation reads "<defocus_u> <defocus_v> <angle>"
        if let Some(annotation) = self.re_estimated.lock().get(&item.id) {
            let values: Vec<f64> = annotation
                .split_whitespace()
                .filter_map(|v| v.parse().ok())
                .collect();
            if let [u, v, angle] = values[..] {
                let mut record = ResultRecord::new(item.id, item.key.clone(), u, v);
                record.defocus_angle = angle;
                return Ok(record);
            }
        }

        let (u, v) = defocus_for(item.id);
        Ok(ResultRecord::new(item.id, item.key.clone(), u, v))
    }
}

/// Plays the external executor around one [`SchedulerLoop`]
pub struct Harness {
    pub config: SchedulerConfig,
    pub source: InMemoryInputSource,
    pub executor: InMemoryStepExecutor,
    pub store: InMemoryOutputStore,
    pub ledger: CompletionLedger,
    pub estimator: Arc<FakeEstimator>,
    pub scheduler: SchedulerLoop,
    pub runner: UnitRunner,
}

impl Harness {
    pub fn new(batch_size: usize) -> Self {
        let mut config = SchedulerConfig::default();
        config.streaming.batch_size = batch_size;
        Self::with_config(config)
    }

    pub fn with_config(config: SchedulerConfig) -> Self {
        Self::build(config, InMemoryInputSource::new("input_items"), InMemoryOutputStore::new())
    }

    pub fn build(
        config: SchedulerConfig,
        source: InMemoryInputSource,
        store: InMemoryOutputStore,
    ) -> Self {
        let executor = InMemoryStepExecutor::new();
        let ledger = CompletionLedger::in_memory();
        let estimator = Arc::new(FakeEstimator::new());
        let scheduler = SchedulerLoop::new(
            config.clone(),
            ledger.clone(),
            Arc::new(source.clone()),
            Arc::new(executor.clone()),
            estimator.clone(),
            Arc::new(store.clone()),
        );
        let runner = UnitRunner::new(ledger.clone(), estimator.clone())
            .with_continue_run(config.continue_run)
            .with_mark_failed_on_error(config.streaming.mark_failed_on_error);
        Self {
            config,
            source,
            executor,
            store,
            ledger,
            estimator,
            scheduler,
            runner,
        }
    }

    /// Run every inserted, not yet run estimation unit and record its status
    pub async fn run_pending_units(&self, ctx: &JobContext) -> Vec<SchedulerResult<UnitReport>> {
        let mut reports = Vec::new();
        for step in self.executor.steps() {
            if step.status != StepStatus::New || step.request.name == JOIN_STEP_NAME {
                continue;
            }
            let report = self
                .runner
                .run_step(&step.request.args, ctx.item_lookup())
                .await;
            let status = if report.is_ok() {
                StepStatus::Finished
            } else {
                StepStatus::Failed
            };
            self.executor
                .set_status(step.id, status)
                .await
                .expect("status update");
            reports.push(report);
        }
        reports
    }

    /// Alternate unit execution and polling until the run finishes
    pub async fn drive(&self, ctx: &mut JobContext, max_polls: usize) -> Vec<PollOutcome> {
        let mut outcomes = Vec::new();
        for _ in 0..max_polls {
            self.run_pending_units(ctx).await;
            let outcome = self.scheduler.steps_check(ctx).await.expect("poll");
            outcomes.push(outcome);
            if ctx.is_finished() {
                break;
            }
        }
        outcomes
    }

    pub fn join_status(&self) -> Option<StepStatus> {
        self.executor
            .steps_named(JOIN_STEP_NAME)
            .first()
            .map(|step| step.status)
    }
}
