//! Error types for the estimation scheduler.
//!

use crate::models::ItemId;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SchedulerError {
    #[error("Ledger error: {0}")]
    LedgerError(String),
    #[error("Input error: {0}")]
    InputError(String),
    #[error("Executor error: {0}")]
    ExecutorError(String),
    #[error("Publication error: {0}")]
    PublicationError(String),
    #[error("Configuration error: {0}")]
    ConfigurationError(String),
    #[error("Estimation error: {0}")]
    EstimationError(String),
    #[error("Invalid state: {0}")]
    InvalidState(String),
    /// No item ever reached the output collection for the whole run.
    #[error("Output '{output}' has size zero, all {tracked} items failed. Please review processing steps above.")]
    AllItemsFailed { output: String, tracked: usize },
    /// Recalculation finalized without a prior output collection to edit.
    #[error("The prior output '{output}' does not exist, all estimations failed")]
    MissingPriorRun { output: String },
}

impl SchedulerError {
    /// Run-level failures end the run; everything else is an operational error
    /// that the executor may retry.
    pub fn is_run_failure(&self) -> bool {
        matches!(
            self,
            Self::AllItemsFailed { .. } | Self::MissingPriorRun { .. }
        )
    }
}

impl From<serde_json::Error> for SchedulerError {
    fn from(error: serde_json::Error) -> Self {
        SchedulerError::InputError(format!("JSON serialization error: {error}"))
    }
}

impl From<LedgerError> for SchedulerError {
    fn from(error: LedgerError) -> Self {
        SchedulerError::LedgerError(error.to_string())
    }
}

impl From<EstimationError> for SchedulerError {
    fn from(error: EstimationError) -> Self {
        SchedulerError::EstimationError(error.to_string())
    }
}

impl From<crate::config::ConfigurationError> for SchedulerError {
    fn from(error: crate::config::ConfigurationError) -> Self {
        SchedulerError::ConfigurationError(error.to_string())
    }
}

pub type SchedulerResult<T> = std::result::Result<T, SchedulerError>;

/// Errors raised by the durable fact store behind the completion ledger
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("I/O failure on '{key}': {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed record line {line_number} in '{key}': {content:?}")]
    MalformedRecord {
        key: String,
        line_number: usize,
        content: String,
    },
}

pub type LedgerResult<T> = std::result::Result<T, LedgerError>;

/// Per-item estimation failures, contained by the scheduler
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EstimationError {
    #[error("Estimation failed for item {item_id}: {reason}")]
    EstimationFailed { item_id: ItemId, reason: String },

    #[error("Could not synthesize result for item {item_id}: {reason}")]
    SynthesisFailed { item_id: ItemId, reason: String },

    #[error("Estimation not supported: {0}")]
    Unsupported(String),
}

impl EstimationError {
    pub fn item_id(&self) -> Option<ItemId> {
        match self {
            Self::EstimationFailed { item_id, .. } | Self::SynthesisFailed { item_id, .. } => {
                Some(*item_id)
            }
            Self::Unsupported(_) => None,
        }
    }
}

pub type EstimationResult<T> = std::result::Result<T, EstimationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_failure_classification() {
        let err = SchedulerError::AllItemsFailed {
            output: "output_results".to_string(),
            tracked: 3,
        };
        assert!(err.is_run_failure());
        assert!(err.to_string().contains("all 3 items failed"));

        let err = SchedulerError::MissingPriorRun {
            output: "output_results".to_string(),
        };
        assert!(err.is_run_failure());

        assert!(!SchedulerError::LedgerError("disk".to_string()).is_run_failure());
    }

    #[test]
    fn test_ledger_error_conversion() {
        let err = LedgerError::MalformedRecord {
            key: "DONE/all.TXT".to_string(),
            line_number: 4,
            content: "abc".to_string(),
        };
        let converted: SchedulerError = err.into();
        match converted {
            SchedulerError::LedgerError(msg) => assert!(msg.contains("line 4")),
            other => panic!("Expected LedgerError, got {other:?}"),
        }
    }

    #[test]
    fn test_estimation_error_item_id() {
        let err = EstimationError::SynthesisFailed {
            item_id: 7,
            reason: "missing output file".to_string(),
        };
        assert_eq!(err.item_id(), Some(7));
        assert_eq!(EstimationError::Unsupported("x".to_string()).item_id(), None);
    }
}
