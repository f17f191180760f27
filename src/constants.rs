//! # Scheduler Constants
//!
//! Step names, durable layout keys, and the stream state shared by input and
//! output collections.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::ItemId;

/// Name of the always-present join unit that publishes the final output
pub const JOIN_STEP_NAME: &str = "createOutputStep";

/// Step name for single-item estimation units
pub const ESTIMATE_STEP_NAME: &str = "estimateStep";

/// Step name for batched estimation units
pub const ESTIMATE_LIST_STEP_NAME: &str = "estimateListStep";

/// Step name for re-estimation units
pub const RE_ESTIMATE_STEP_NAME: &str = "reEstimateStep";

/// Name of the published output collection
pub const OUTPUT_NAME: &str = "output_results";

/// Suffix of the output collection produced by a recalculation run
pub const RECALCULATED_SUFFIX: &str = "_recalculated";

/// Keys of the durable ledger layout
pub mod layout {
    use super::ItemId;

    /// Namespace holding one write-once marker per finished item
    pub const DONE_NAMESPACE: &str = "DONE";

    /// Append-only record of every item id confirmed done by the scheduler
    pub const ALL_DONE_RECORD: &str = "DONE/all.TXT";

    /// Namespace holding one marker per item whose unit body errored
    pub const FAILED_NAMESPACE: &str = "FAILED";

    /// Append-only record of every item id whose result could not be produced
    pub const ALL_FAILED_RECORD: &str = "FAILED_all.TXT";

    /// Marker key for a single item
    pub fn marker_key(item_id: ItemId) -> String {
        format!("{DONE_NAMESPACE}/item_{item_id:06}.TXT")
    }

    /// Failure marker key for a single item
    pub fn failure_marker_key(item_id: ItemId) -> String {
        format!("{FAILED_NAMESPACE}/item_{item_id:06}.TXT")
    }
}

/// Lifecycle event names published by the scheduler
pub mod events {
    pub const UNITS_INSERTED: &str = "scheduler.units_inserted";
    pub const OUTPUT_UPDATED: &str = "scheduler.output_updated";
    pub const FINISHED: &str = "scheduler.finished";
}

/// Stream state of an input or output collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StreamState {
    /// More items may still be appended
    #[default]
    Open,
    /// The collection is final
    Closed,
}

impl StreamState {
    pub fn from_closed(closed: bool) -> Self {
        if closed {
            Self::Closed
        } else {
            Self::Open
        }
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }
}

impl fmt::Display for StreamState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => write!(f, "open"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marker_key_is_zero_padded() {
        assert_eq!(layout::marker_key(12), "DONE/item_000012.TXT");
        assert_eq!(layout::marker_key(1234567), "DONE/item_1234567.TXT");
        assert_eq!(layout::failure_marker_key(12), "FAILED/item_000012.TXT");
    }

    #[test]
    fn test_stream_state_from_closed() {
        assert_eq!(StreamState::from_closed(true), StreamState::Closed);
        assert_eq!(StreamState::from_closed(false), StreamState::Open);
        assert!(StreamState::Closed.is_closed());
        assert_eq!(StreamState::Open.to_string(), "open");
    }
}
