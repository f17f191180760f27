//! # Step Executor Seam
//!
//! The external engine that actually runs work units and tracks their
//! waiting/ready/running/finished state. The scheduler only inserts units,
//! wires prerequisites onto the join unit, and releases the join unit's wait
//! condition.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::error::{SchedulerError, SchedulerResult};
use crate::models::{UnitId, WorkUnit};
use crate::state_machine::StepStatus;

/// Request to insert one unit into the execution graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRequest {
    pub name: String,
    pub args: Value,
    pub prerequisites: Vec<UnitId>,
    /// Inserted units with `wait` set stay blocked until released
    pub wait: bool,
}

impl StepRequest {
    pub fn from_work_unit(unit: &WorkUnit) -> Self {
        Self {
            name: unit.step_name().to_string(),
            args: unit.step_args(),
            prerequisites: unit.prerequisites.clone(),
            wait: false,
        }
    }

    pub fn join(name: impl Into<String>, prerequisites: Vec<UnitId>, wait: bool) -> Self {
        Self {
            name: name.into(),
            args: Value::Null,
            prerequisites,
            wait,
        }
    }
}

/// Executor view of an inserted unit
#[derive(Debug, Clone, PartialEq)]
pub struct StepHandle {
    pub id: UnitId,
    pub name: String,
    pub status: StepStatus,
}

impl StepHandle {
    pub fn is_waiting(&self) -> bool {
        self.status.is_waiting()
    }
}

#[async_trait]
pub trait StepExecutor: Send + Sync {
    /// Insert a unit and return the id the executor assigned to it
    async fn insert_work_unit(&self, request: StepRequest) -> SchedulerResult<UnitId>;

    /// Make `join_unit` wait on every unit in `unit_ids` as well
    async fn add_prerequisites(&self, join_unit: UnitId, unit_ids: &[UnitId])
        -> SchedulerResult<()>;

    /// First inserted unit with the given name
    async fn get_step_by_name(&self, name: &str) -> SchedulerResult<Option<StepHandle>>;

    async fn set_status(&self, unit_id: UnitId, status: StepStatus) -> SchedulerResult<()>;
}

/// Unit recorded by [`InMemoryStepExecutor`]
#[derive(Debug, Clone, PartialEq)]
pub struct StepRecord {
    pub id: UnitId,
    pub request: StepRequest,
    pub status: StepStatus,
}

/// Executor double that records insertions; clones share the same graph
#[derive(Debug, Default, Clone)]
pub struct InMemoryStepExecutor {
    steps: Arc<Mutex<Vec<StepRecord>>>,
}

impl InMemoryStepExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn steps(&self) -> Vec<StepRecord> {
        self.steps.lock().clone()
    }

    pub fn steps_named(&self, name: &str) -> Vec<StepRecord> {
        self.steps
            .lock()
            .iter()
            .filter(|s| s.request.name == name)
            .cloned()
            .collect()
    }

    pub fn step(&self, unit_id: UnitId) -> Option<StepRecord> {
        self.steps.lock().iter().find(|s| s.id == unit_id).cloned()
    }
}

#[async_trait]
impl StepExecutor for InMemoryStepExecutor {
    async fn insert_work_unit(&self, request: StepRequest) -> SchedulerResult<UnitId> {
        let mut steps = self.steps.lock();
        let id = steps.len() as UnitId + 1;
        let status = if request.wait {
            StepStatus::Waiting
        } else {
            StepStatus::New
        };
        steps.push(StepRecord {
            id,
            request,
            status,
        });
        Ok(id)
    }

    async fn add_prerequisites(
        &self,
        join_unit: UnitId,
        unit_ids: &[UnitId],
    ) -> SchedulerResult<()> {
        let mut steps = self.steps.lock();
        let step = steps
            .iter_mut()
            .find(|s| s.id == join_unit)
            .ok_or_else(|| SchedulerError::ExecutorError(format!("Unknown unit {join_unit}")))?;
        step.request.prerequisites.extend_from_slice(unit_ids);
        Ok(())
    }

    async fn get_step_by_name(&self, name: &str) -> SchedulerResult<Option<StepHandle>> {
        Ok(self
            .steps
            .lock()
            .iter()
            .find(|s| s.request.name == name)
            .map(|s| StepHandle {
                id: s.id,
                name: s.request.name.clone(),
                status: s.status,
            }))
    }

    async fn set_status(&self, unit_id: UnitId, status: StepStatus) -> SchedulerResult<()> {
        let mut steps = self.steps.lock();
        let step = steps
            .iter_mut()
            .find(|s| s.id == unit_id)
            .ok_or_else(|| SchedulerError::ExecutorError(format!("Unknown unit {unit_id}")))?;
        step.status = status;
        Ok(())
    }
}
