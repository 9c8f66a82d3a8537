use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;

use subtask_model::{TaskContext, TaskId};

use crate::event::ProgressSink;

/// Execution parameters handed to an executor alongside the prompt.
#[derive(Debug, Clone)]
pub struct ExecOptions {
    pub task_id: TaskId,
    /// The engine enforces this independently; executors may use it to bound
    /// their own teardown.
    pub timeout: Duration,
    pub priority: i32,
    pub context: TaskContext,
    pub working_dir: Option<PathBuf>,
    pub progress: ProgressSink,
}

/// What an executor reports back for one invocation.
#[derive(Debug, Clone)]
pub struct ExecOutcome {
    pub task_id: TaskId,
    pub success: bool,
    pub result: Option<String>,
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl ExecOutcome {
    pub fn success(task_id: TaskId, result: Option<String>, duration_ms: u64) -> Self {
        Self {
            task_id,
            success: true,
            result,
            error: None,
            duration_ms,
        }
    }

    pub fn failure(task_id: TaskId, error: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            task_id,
            success: false,
            result: None,
            error: Some(error.into()),
            duration_ms,
        }
    }
}

/// Capability interface the engine drives.
///
/// Implementations live outside the core (see the exec crate) and are picked
/// through an [`crate::ExecutorRegistry`] by configuration string.
#[async_trait]
pub trait SubAgentExecutor: Send + Sync {
    /// Short identifier for logging and registry diagnostics.
    fn name(&self) -> &'static str;

    /// Whether this executor can run sub-agent tasks at all. When `false`,
    /// submissions fail fast before any state transition.
    fn supports_sub_agents(&self) -> bool {
        true
    }

    /// Run one task to completion. Failures are reported inside the outcome,
    /// never panicked.
    async fn execute_sub_agent(
        &self,
        task_type: &str,
        prompt: &str,
        opts: ExecOptions,
    ) -> ExecOutcome;

    /// Cooperatively abort an in-flight task. Must be safe to call for ids
    /// that already finished or were never started.
    async fn cancel_sub_agent(&self, task_id: &TaskId);
}
