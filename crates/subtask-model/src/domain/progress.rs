use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::{AgentId, TaskId};

/// Best-effort mid-execution signal.
///
/// Purely observational; never required for correctness and never awaited by
/// the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    pub task_id: TaskId,
    pub agent_id: AgentId,
    /// Completion estimate, clamped to 0..=100.
    pub percent: u8,
    pub message: String,
    #[serde(with = "crate::domain::time_serde")]
    pub timestamp: SystemTime,
}

impl ProgressEvent {
    pub fn new(
        task_id: TaskId,
        agent_id: AgentId,
        percent: u8,
        message: impl Into<String>,
    ) -> Self {
        Self {
            task_id,
            agent_id,
            percent: percent.min(100),
            message: message.into(),
            timestamp: SystemTime::now(),
        }
    }
}
