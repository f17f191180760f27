//! # Recalculation Planner
//!
//! Plans a one-shot re-estimation pass over items a user flagged in an edited
//! copy of prior results. Runs once per run, before any polling; the streaming
//! loop never participates.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::EstimationSettings;
use crate::error::{SchedulerError, SchedulerResult};
use crate::models::{RecalculationRequest, TrackedSet, WorkUnit, WorkUnitKind};
use crate::orchestration::estimator::EstimationParams;

/// Arguments carried by a re-estimation unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReEstimateArgs {
    pub annotation: String,
    pub params: EstimationParams,
}

/// Output of the recalculation planner
#[derive(Debug, Clone, Default)]
pub struct RecalculationPlan {
    /// One independent unit per actionable request
    pub units: Vec<WorkUnit>,
    /// Original input items of the planned units
    pub items: TrackedSet,
    /// Every request, planned or passed through, in edited-copy order
    pub requests: Vec<RecalculationRequest>,
}

impl RecalculationPlan {
    pub fn planned_count(&self) -> usize {
        self.units.len()
    }

    pub fn skipped_count(&self) -> usize {
        self.requests.len() - self.units.len()
    }
}

#[derive(Debug, Clone, Default)]
pub struct RecalculationPlanner {
    settings: EstimationSettings,
}

impl RecalculationPlanner {
    pub fn new(settings: EstimationSettings) -> Self {
        Self { settings }
    }

    /// Plan re-estimation units. Disabled or annotation-less requests are
    /// passed through without a unit. A request for an item missing from the
    /// input lookup is an input error.
    pub fn plan(
        &self,
        input: &TrackedSet,
        requests: Vec<RecalculationRequest>,
    ) -> SchedulerResult<RecalculationPlan> {
        let mut plan = RecalculationPlan::default();

        for request in &requests {
            if !request.is_actionable() {
                debug!(item_id = request.item_id, "Keeping prior result unchanged");
                continue;
            }

            let item = input.get_by_id(request.item_id).ok_or_else(|| {
                SchedulerError::InputError(format!(
                    "Recalculation requested for unknown item {}",
                    request.item_id
                ))
            })?;

            let args = ReEstimateArgs {
                annotation: request.annotation.clone(),
                params: EstimationParams::for_recalculation(item, &self.settings),
            };

            plan.units.push(WorkUnit {
                kind: WorkUnitKind::ReEstimate,
                item_keys: vec![item.key.clone()],
                item_ids: vec![item.id],
                prerequisites: Vec::new(),
                args: serde_json::to_value(&args)?,
            });
            plan.items.insert(Arc::clone(item));
        }

        plan.requests = requests;
        info!(
            planned = plan.planned_count(),
            skipped = plan.skipped_count(),
            "Planned re-estimation units"
        );
        Ok(plan)
    }
}
