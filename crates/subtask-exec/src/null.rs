use async_trait::async_trait;

use subtask_core::{ExecOptions, ExecOutcome, SubAgentExecutor};
use subtask_model::TaskId;

/// Placeholder executor that advertises no sub-agent capability.
///
/// Submissions against it fail fast at admission; the execute path only
/// exists to satisfy the trait and reports a failure outcome.
#[derive(Default)]
pub struct NullExecutor;

impl NullExecutor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SubAgentExecutor for NullExecutor {
    fn name(&self) -> &'static str {
        "null"
    }

    fn supports_sub_agents(&self) -> bool {
        false
    }

    async fn execute_sub_agent(
        &self,
        _task_type: &str,
        _prompt: &str,
        opts: ExecOptions,
    ) -> ExecOutcome {
        ExecOutcome::failure(opts.task_id, "sub-agent execution is disabled", 0)
    }

    async fn cancel_sub_agent(&self, _task_id: &TaskId) {}
}
