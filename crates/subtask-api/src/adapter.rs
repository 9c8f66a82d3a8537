use std::sync::Arc;

use async_trait::async_trait;

use subtask_core::{SubAgentEngine, Submission};
use subtask_model::{
    AgentStats, Statistics, SubmitOptions, TaskId, TaskPage, TaskQuery, TaskRequest, TaskStatus,
};

use crate::error::ApiError;
use crate::handler::{ApiHandler, SubmitTask};

/// Ready-to-use [`ApiHandler`] that delegates directly to the engine.
pub struct EngineAdapter {
    engine: Arc<SubAgentEngine>,
}

impl EngineAdapter {
    pub fn new(engine: Arc<SubAgentEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl ApiHandler for EngineAdapter {
    async fn submit_task(&self, submit: SubmitTask) -> Result<Submission, ApiError> {
        let options = SubmitOptions {
            priority: submit.priority,
            timeout_ms: submit.timeout_ms,
            context: submit.context,
            working_dir: submit.working_dir,
        };
        self.engine
            .submit(
                submit.agent_id,
                submit.task_type,
                submit.description,
                submit.prompt,
                options,
            )
            .map_err(ApiError::from)
    }

    async fn cancel_task(&self, id: &TaskId) -> Result<(), ApiError> {
        self.engine.cancel(id).map_err(ApiError::from)
    }

    async fn cancel_agent(&self, agent_id: &str) -> Result<(), ApiError> {
        self.engine.cancel_all(agent_id);
        Ok(())
    }

    async fn get_task(
        &self,
        id: &TaskId,
    ) -> Result<Option<(TaskRequest, TaskStatus)>, ApiError> {
        Ok(self.engine.find_task(id))
    }

    async fn query_tasks(&self, query: TaskQuery) -> Result<TaskPage<TaskRequest>, ApiError> {
        Ok(self.engine.query(&query))
    }

    async fn stats(&self) -> Result<Statistics, ApiError> {
        Ok(self.engine.stats())
    }

    async fn agent_stats(&self, agent_id: &str) -> Result<AgentStats, ApiError> {
        Ok(self.engine.agent_stats(agent_id))
    }
}
