use std::path::PathBuf;

use async_trait::async_trait;
use serde::Deserialize;

use subtask_core::Submission;
use subtask_model::{
    AgentStats, Statistics, TaskContext, TaskId, TaskPage, TaskQuery, TaskRequest, TaskStatus,
    TimeoutMs,
};

use crate::error::ApiError;

/// Submission payload as accepted from API clients.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitTask {
    pub agent_id: String,
    pub task_type: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub prompt: String,
    pub priority: Option<i32>,
    pub timeout_ms: Option<TimeoutMs>,
    pub context: Option<TaskContext>,
    pub working_dir: Option<PathBuf>,
}

/// Task orchestration API handler.
///
/// Abstracts the backend so users can either mount the provided
/// [`crate::EngineAdapter`] or wrap it with custom logic.
#[async_trait]
pub trait ApiHandler: Send + Sync + 'static {
    /// Admit a new task; the returned submission resolves to its result.
    async fn submit_task(&self, submit: SubmitTask) -> Result<Submission, ApiError>;

    /// Cancel one active task.
    async fn cancel_task(&self, id: &TaskId) -> Result<(), ApiError>;

    /// Cancel an agent's active task and discard its queue.
    async fn cancel_agent(&self, agent_id: &str) -> Result<(), ApiError>;

    /// Look one live task up by id.
    async fn get_task(&self, id: &TaskId)
    -> Result<Option<(TaskRequest, TaskStatus)>, ApiError>;

    /// List live tasks with filtering and pagination.
    async fn query_tasks(&self, query: TaskQuery) -> Result<TaskPage<TaskRequest>, ApiError>;

    async fn stats(&self) -> Result<Statistics, ApiError>;

    async fn agent_stats(&self, agent_id: &str) -> Result<AgentStats, ApiError>;
}
