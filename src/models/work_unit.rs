use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::{ESTIMATE_LIST_STEP_NAME, ESTIMATE_STEP_NAME, RE_ESTIMATE_STEP_NAME};
use crate::models::ItemId;

/// Identifier assigned to a unit by the external executor
pub type UnitId = i64;

/// What a work unit does with the items it covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkUnitKind {
    /// One item, looked up by natural key
    Estimate,
    /// A consecutive chunk of items
    EstimateBatch,
    /// One item re-estimated under edited parameters
    ReEstimate,
}

impl WorkUnitKind {
    pub fn step_name(&self) -> &'static str {
        match self {
            Self::Estimate => ESTIMATE_STEP_NAME,
            Self::EstimateBatch => ESTIMATE_LIST_STEP_NAME,
            Self::ReEstimate => RE_ESTIMATE_STEP_NAME,
        }
    }
}

/// One schedulable task. Never mutated after planning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkUnit {
    pub kind: WorkUnitKind,
    pub item_keys: Vec<String>,
    pub item_ids: Vec<ItemId>,
    /// Always empty for estimation units, which are mutually independent
    pub prerequisites: Vec<UnitId>,
    /// Serialized estimation parameters handed to the unit body
    pub args: Value,
}

impl WorkUnit {
    pub fn step_name(&self) -> &'static str {
        self.kind.step_name()
    }

    pub fn len(&self) -> usize {
        self.item_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.item_ids.is_empty()
    }

    /// Arguments passed to the executor when the unit is inserted
    pub fn step_args(&self) -> Value {
        serde_json::json!({
            "kind": self.kind,
            "item_keys": self.item_keys,
            "item_ids": self.item_ids,
            "params": self.args,
        })
    }

    /// Rebuild a unit from the arguments it was inserted with
    pub fn from_step_args(args: &Value) -> serde_json::Result<Self> {
        #[derive(Deserialize)]
        struct StepArgs {
            kind: WorkUnitKind,
            item_keys: Vec<String>,
            item_ids: Vec<ItemId>,
            #[serde(default)]
            params: Value,
        }

        let StepArgs {
            kind,
            item_keys,
            item_ids,
            params,
        } = StepArgs::deserialize(args)?;
        Ok(Self {
            kind,
            item_keys,
            item_ids,
            prerequisites: Vec::new(),
            args: params,
        })
    }
}
