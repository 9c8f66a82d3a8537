use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::{AgentId, TaskContext, TaskId, TaskStatus};

/// Terminal outcome of exactly one [`crate::TaskRequest`].
///
/// Created once, at the moment a terminal state is reached; immutable
/// thereafter.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskResult {
    /// Matches the originating request.
    pub id: TaskId,
    pub agent_id: AgentId,
    pub task_type: String,
    /// Always one of the terminal statuses.
    pub status: TaskStatus,
    /// Present iff the task succeeded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    /// Absent for succeeded tasks; holds the failure, timeout or
    /// cancellation reason otherwise.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub execution_time_ms: u64,
    #[serde(with = "crate::domain::time_serde")]
    pub completed_at: SystemTime,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<TaskContext>,
}

impl TaskResult {
    pub fn succeeded(&self) -> bool {
        self.status == TaskStatus::Succeeded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_serde_optional_fields_skipped() {
        let result = TaskResult {
            id: TaskId::from("t-1"),
            agent_id: "agent-1".to_string(),
            task_type: "review".to_string(),
            status: TaskStatus::Succeeded,
            output: Some("looks good".to_string()),
            error: None,
            execution_time_ms: 42,
            completed_at: SystemTime::now(),
            metadata: None,
        };

        let json = serde_json::to_string(&result).unwrap();
        assert!(json.contains("looks good"));
        assert!(!json.contains("error"));
        assert!(!json.contains("metadata"));

        let back: TaskResult = serde_json::from_str(&json).unwrap();
        assert!(back.succeeded());
        assert_eq!(back.execution_time_ms, 42);
    }
}
