use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of one streaming scheduler run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerState {
    /// Polling for new input and new completions
    #[default]
    Running,
    /// Input closed and every tracked item accounted for; irreversible
    Finished,
}

impl SchedulerState {
    /// Check if this is a terminal state (no further transitions allowed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished)
    }
}

impl fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Finished => write!(f, "finished"),
        }
    }
}

impl std::str::FromStr for SchedulerState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(Self::Running),
            "finished" => Ok(Self::Finished),
            _ => Err(format!("Invalid scheduler state: {s}")),
        }
    }
}

/// Status of a unit as tracked by the external executor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Inserted with a wait condition; not runnable until released
    Waiting,
    /// Runnable once its prerequisites finish
    New,
    /// Prerequisites satisfied, queued for a worker
    Ready,
    Running,
    Finished,
    Failed,
}

impl StepStatus {
    pub fn is_waiting(&self) -> bool {
        matches!(self, Self::Waiting)
    }

    /// Check if this is a terminal state (no further transitions allowed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished | Self::Failed)
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Waiting => write!(f, "waiting"),
            Self::New => write!(f, "new"),
            Self::Ready => write!(f, "ready"),
            Self::Running => write!(f, "running"),
            Self::Finished => write!(f, "finished"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheduler_state_round_trip_through_str() {
        for state in [SchedulerState::Running, SchedulerState::Finished] {
            assert_eq!(state.to_string().parse::<SchedulerState>(), Ok(state));
        }
        assert!("paused".parse::<SchedulerState>().is_err());
        assert!(SchedulerState::Finished.is_terminal());
        assert!(!SchedulerState::Running.is_terminal());
    }

    #[test]
    fn test_step_status_predicates() {
        assert!(StepStatus::Waiting.is_waiting());
        assert!(!StepStatus::New.is_waiting());
        assert!(StepStatus::Failed.is_terminal());
        assert!(!StepStatus::Running.is_terminal());
    }
}
