//! # Unit Runner
//!
//! Executes the body of one work unit on behalf of the external executor and
//! leaves a completion marker for every item it finished. The marker is the
//! only signal the scheduler loop consumes; nothing is returned to it
//! directly.

use serde_json::Value;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::error::{LedgerError, SchedulerError, SchedulerResult};
use crate::ledger::CompletionLedger;
use crate::logging::{log_error, log_unit_operation};
use crate::models::{InputItem, ItemId, TrackedSet, WorkUnit, WorkUnitKind};
use crate::orchestration::estimator::{EstimationParams, Estimator};
use crate::orchestration::recalculation_planner::ReEstimateArgs;

/// What a unit body did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnitReport {
    pub estimated: Vec<ItemId>,
    /// Already done by a previous run and left untouched
    pub skipped: Vec<ItemId>,
}

pub struct UnitRunner {
    ledger: CompletionLedger,
    estimator: Arc<dyn Estimator>,
    continue_run: bool,
    mark_failed_on_error: bool,
}

impl std::fmt::Debug for UnitRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnitRunner")
            .field("continue_run", &self.continue_run)
            .field("mark_failed_on_error", &self.mark_failed_on_error)
            .finish_non_exhaustive()
    }
}

impl UnitRunner {
    pub fn new(ledger: CompletionLedger, estimator: Arc<dyn Estimator>) -> Self {
        Self {
            ledger,
            estimator,
            continue_run: false,
            mark_failed_on_error: false,
        }
    }

    /// Keep items whose marker survives from a previous run
    pub fn with_continue_run(mut self, continue_run: bool) -> Self {
        self.continue_run = continue_run;
        self
    }

    /// Leave a failure marker for every item the estimator was working on when
    /// it errored
    pub fn with_mark_failed_on_error(mut self, mark_failed_on_error: bool) -> Self {
        self.mark_failed_on_error = mark_failed_on_error;
        self
    }

    /// Run the unit described by the arguments it was inserted with
    pub async fn run_step(&self, args: &Value, lookup: &TrackedSet) -> SchedulerResult<UnitReport> {
        let unit = WorkUnit::from_step_args(args)?;
        self.run(&unit, lookup).await
    }

    /// Run `unit`, resolving its item keys through `lookup`
    #[instrument(skip_all, fields(step = unit.step_name(), items = unit.len()))]
    pub async fn run(&self, unit: &WorkUnit, lookup: &TrackedSet) -> SchedulerResult<UnitReport> {
        let items = unit
            .item_keys
            .iter()
            .map(|key| {
                lookup.get(key).cloned().ok_or_else(|| {
                    SchedulerError::InputError(format!("Unit refers to unknown item '{key}'"))
                })
            })
            .collect::<SchedulerResult<Vec<_>>>()?;

        let result = match unit.kind {
            WorkUnitKind::Estimate | WorkUnitKind::EstimateBatch => {
                let params: EstimationParams = serde_json::from_value(unit.args.clone())?;
                self.run_estimate(unit.kind, &items, &params).await
            }
            WorkUnitKind::ReEstimate => {
                let args: ReEstimateArgs = serde_json::from_value(unit.args.clone())?;
                self.run_re_estimate(&items, &args).await
            }
        };

        match result {
            Ok(report) => {
                log_unit_operation(
                    "run",
                    None,
                    unit.step_name(),
                    report.estimated.len(),
                    "finished",
                    None,
                );
                Ok(report)
            }
            Err(UnitFailure { attempted, error }) => {
                log_error("unit_runner", unit.step_name(), &error.to_string(), None);
                if self.mark_failed_on_error {
                    // Skipped items keep their done marker
                    for item_id in &attempted {
                        self.ledger.mark_unit_failed(*item_id).await?;
                    }
                }
                Err(error)
            }
        }
    }

    async fn run_estimate(
        &self,
        kind: WorkUnitKind,
        items: &[Arc<InputItem>],
        params: &EstimationParams,
    ) -> Result<UnitReport, UnitFailure> {
        let mut report = UnitReport::default();
        let mut pending = Vec::with_capacity(items.len());
        for item in items {
            if self.continue_run && self.ledger.is_done(item.id).await? {
                info!(item_id = item.id, "Skipping item, already processed");
                report.skipped.push(item.id);
                continue;
            }
            self.ledger.clear_marker(item.id).await?;
            pending.push(Arc::clone(item));
        }

        let estimated = match (kind, pending.as_slice()) {
            (_, []) => Ok(()),
            (WorkUnitKind::Estimate, [item]) => self.estimator.estimate_one(item, params).await,
            _ => self.estimator.estimate_batch(&pending, params).await,
        };
        if let Err(e) = estimated {
            return Err(UnitFailure {
                attempted: pending.iter().map(|item| item.id).collect(),
                error: e.into(),
            });
        }

        for item in &pending {
            self.ledger.mark_done(item.id).await?;
            report.estimated.push(item.id);
        }
        Ok(report)
    }

    async fn run_re_estimate(
        &self,
        items: &[Arc<InputItem>],
        args: &ReEstimateArgs,
    ) -> Result<UnitReport, UnitFailure> {
        let mut report = UnitReport::default();
        for item in items {
            self.ledger.clear_marker(item.id).await?;
            if let Err(e) = self
                .estimator
                .re_estimate(item, &args.annotation, &args.params)
                .await
            {
                warn!(item_id = item.id, annotation = %args.annotation, "Re-estimation failed");
                return Err(UnitFailure {
                    attempted: vec![item.id],
                    error: e.into(),
                });
            }
            self.ledger.mark_done(item.id).await?;
            report.estimated.push(item.id);
        }
        Ok(report)
    }
}

/// A unit body error and the items it was estimating when it happened
struct UnitFailure {
    attempted: Vec<ItemId>,
    error: SchedulerError,
}

impl From<LedgerError> for UnitFailure {
    fn from(error: LedgerError) -> Self {
        Self {
            attempted: Vec::new(),
            error: error.into(),
        }
    }
}
