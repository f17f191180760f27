//! # Models
//!
//! Input items, planned work units, result records and the output collection.

pub mod input_item;
pub mod output;
pub mod recalculation;
pub mod work_unit;

// Re-export core models for easy access
pub use input_item::{Acquisition, CollectionProperties, InputItem, ItemId, TrackedSet};
pub use output::{OutputCollection, ResultRecord};
pub use recalculation::RecalculationRequest;
pub use work_unit::{UnitId, WorkUnit, WorkUnitKind};
