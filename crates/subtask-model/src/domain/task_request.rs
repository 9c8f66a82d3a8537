use std::path::PathBuf;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::{AgentId, TaskContext, TaskId, TimeoutMs};

/// Identity and intent of one unit of delegated work.
///
/// Created by the engine at admission and destroyed when the task reaches a
/// terminal outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRequest {
    /// Unique identifier, engine-generated.
    pub id: TaskId,
    /// The agent on whose behalf the task runs.
    pub agent_id: AgentId,
    /// Category tag; never interpreted by the engine.
    pub task_type: String,
    /// Human-readable summary of the work.
    pub description: String,
    /// Opaque text payload handed to the executor.
    pub prompt: String,
    /// Informational only; queue order is strictly submission order.
    pub priority: i32,
    /// Effective timeout, resolved from options or configuration at admission.
    pub timeout_ms: TimeoutMs,
    /// Working directory forwarded to the executor.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<PathBuf>,
    /// Opaque key–value bag forwarded to the executor.
    #[serde(default, skip_serializing_if = "TaskContext::is_empty")]
    pub context: TaskContext,
    /// When the request was accepted.
    #[serde(with = "crate::domain::time_serde")]
    pub created_at: SystemTime,
}

/// Caller-supplied knobs for a submission.
///
/// Everything is optional; unset fields fall back to engine configuration.
#[derive(Debug, Clone, Default)]
pub struct SubmitOptions {
    pub priority: Option<i32>,
    pub timeout_ms: Option<TimeoutMs>,
    pub context: Option<TaskContext>,
    pub working_dir: Option<PathBuf>,
}

impl SubmitOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: TimeoutMs) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn with_context(mut self, context: TaskContext) -> Self {
        self.context = Some(context);
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serde_skips_empty_optionals() {
        let req = TaskRequest {
            id: TaskId::from("t-1"),
            agent_id: "agent-1".to_string(),
            task_type: "review".to_string(),
            description: "review the diff".to_string(),
            prompt: "...".to_string(),
            priority: 0,
            timeout_ms: 300_000,
            working_dir: None,
            context: TaskContext::new(),
            created_at: SystemTime::now(),
        };

        let json = serde_json::to_string(&req).unwrap();
        assert!(!json.contains("workingDir"));
        assert!(!json.contains("context"));

        let back: TaskRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, req.id);
        assert_eq!(back.timeout_ms, req.timeout_ms);
    }

    #[test]
    fn options_builder_sets_fields() {
        let opts = SubmitOptions::new()
            .with_priority(2)
            .with_timeout_ms(5_000)
            .with_working_dir("/tmp/work");

        assert_eq!(opts.priority, Some(2));
        assert_eq!(opts.timeout_ms, Some(5_000));
        assert!(opts.context.is_none());
        assert_eq!(opts.working_dir.as_deref().unwrap().to_str(), Some("/tmp/work"));
    }
}
