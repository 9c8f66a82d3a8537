use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Current execution state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TaskStatus {
    /// Task is waiting in its agent's FIFO queue.
    Queued,
    /// Task is currently executing.
    Active,
    /// Task completed successfully.
    Succeeded,
    /// Task failed with an error.
    Failed,
    /// Task exceeded its timeout limit.
    TimedOut,
    /// Task was explicitly cancelled (or discarded before starting).
    Cancelled,
}

/// Error returned when parsing an unknown status string.
#[derive(Debug, Error)]
#[error("invalid status: '{0}' (valid: queued, active, succeeded, failed, timedOut, cancelled)")]
pub struct ParseStatusError(pub String);

impl TaskStatus {
    /// Returns `true` if the task is in a terminal state (won't transition further).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Succeeded
                | TaskStatus::Failed
                | TaskStatus::TimedOut
                | TaskStatus::Cancelled
        )
    }

    /// Returns `true` if the task is still pending or running.
    pub fn is_active(&self) -> bool {
        matches!(self, TaskStatus::Queued | TaskStatus::Active)
    }
}

impl FromStr for TaskStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "queued" => Ok(TaskStatus::Queued),
            "active" => Ok(TaskStatus::Active),
            "succeeded" => Ok(TaskStatus::Succeeded),
            "failed" => Ok(TaskStatus::Failed),
            "timedout" => Ok(TaskStatus::TimedOut),
            "cancelled" | "canceled" => Ok(TaskStatus::Cancelled),
            _ => Err(ParseStatusError(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(TaskStatus::Succeeded.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(TaskStatus::TimedOut.is_terminal());
        assert!(TaskStatus::Cancelled.is_terminal());

        assert!(!TaskStatus::Queued.is_terminal());
        assert!(!TaskStatus::Active.is_terminal());
    }

    #[test]
    fn active_states() {
        assert!(TaskStatus::Queued.is_active());
        assert!(TaskStatus::Active.is_active());

        assert!(!TaskStatus::Succeeded.is_active());
        assert!(!TaskStatus::Cancelled.is_active());
    }

    #[test]
    fn parse_accepts_both_spellings_of_cancelled() {
        assert_eq!(
            "cancelled".parse::<TaskStatus>().unwrap(),
            TaskStatus::Cancelled
        );
        assert_eq!(
            "canceled".parse::<TaskStatus>().unwrap(),
            TaskStatus::Cancelled
        );
        assert!("done".parse::<TaskStatus>().is_err());
    }

    #[test]
    fn serde_roundtrip() {
        let status = TaskStatus::TimedOut;
        let json = serde_json::to_string(&status).unwrap();
        assert_eq!(json, r#""timedOut""#);

        let back: TaskStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(back, status);
    }
}
