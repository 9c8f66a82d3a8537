use std::collections::HashMap;
use std::sync::Arc;

use tracing::warn;

use crate::executor::SubAgentExecutor;

/// Maps configuration selector strings to executor implementations.
///
/// A default is mandatory: unknown selectors fall back to it with a warning
/// instead of failing hard, so a typo in configuration degrades instead of
/// breaking submissions.
pub struct ExecutorRegistry {
    executors: HashMap<String, Arc<dyn SubAgentExecutor>>,
    default_name: String,
}

impl ExecutorRegistry {
    pub fn new(default_name: impl Into<String>, default_executor: Arc<dyn SubAgentExecutor>) -> Self {
        let default_name = default_name.into();
        let mut executors: HashMap<String, Arc<dyn SubAgentExecutor>> = HashMap::new();
        executors.insert(default_name.clone(), default_executor);
        Self {
            executors,
            default_name,
        }
    }

    pub fn register(&mut self, name: impl Into<String>, executor: Arc<dyn SubAgentExecutor>) {
        self.executors.insert(name.into(), executor);
    }

    pub fn default_name(&self) -> &str {
        &self.default_name
    }

    pub fn names(&self) -> Vec<&str> {
        self.executors.keys().map(String::as_str).collect()
    }

    pub fn select(&self, selector: &str) -> Arc<dyn SubAgentExecutor> {
        if let Some(executor) = self.executors.get(selector) {
            return Arc::clone(executor);
        }
        warn!(
            selector,
            fallback = %self.default_name,
            "unknown executor selector; falling back to default"
        );
        Arc::clone(&self.executors[&self.default_name])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{ExecOptions, ExecOutcome};
    use async_trait::async_trait;
    use subtask_model::TaskId;

    struct Named(&'static str);

    #[async_trait]
    impl SubAgentExecutor for Named {
        fn name(&self) -> &'static str {
            self.0
        }

        async fn execute_sub_agent(
            &self,
            _task_type: &str,
            _prompt: &str,
            opts: ExecOptions,
        ) -> ExecOutcome {
            ExecOutcome::success(opts.task_id, None, 0)
        }

        async fn cancel_sub_agent(&self, _task_id: &TaskId) {}
    }

    #[test]
    fn select_prefers_exact_match() {
        let mut registry = ExecutorRegistry::new("builtin", Arc::new(Named("builtin")));
        registry.register("process", Arc::new(Named("process")));

        assert_eq!(registry.select("process").name(), "process");
        assert_eq!(registry.select("builtin").name(), "builtin");
    }

    #[test]
    fn unknown_selector_falls_back_to_default() {
        let registry = ExecutorRegistry::new("builtin", Arc::new(Named("builtin")));
        assert_eq!(registry.select("no-such-executor").name(), "builtin");
    }
}
