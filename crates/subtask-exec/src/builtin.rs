use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Instant;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use subtask_core::{ExecOptions, ExecOutcome, SubAgentExecutor};
use subtask_model::TaskId;

use crate::error::ExecError;

type HandlerFuture = Pin<Box<dyn Future<Output = Result<String, String>> + Send>>;
type Handler = Arc<dyn Fn(String, ExecOptions) -> HandlerFuture + Send + Sync>;

/// In-process executor backed by registered async handlers.
///
/// Handlers are keyed by task type and must be registered before they can be
/// used; an unknown type yields a failed outcome. Handlers receive the fully
/// assembled prompt and the execution options (including the progress sink)
/// and report `Ok(output)` or `Err(message)`.
pub struct BuiltinExecutor {
    name: &'static str,
    handlers: RwLock<HashMap<String, Handler>>,
    in_flight: Mutex<HashMap<TaskId, CancellationToken>>,
}

impl BuiltinExecutor {
    pub fn new() -> Self {
        Self {
            name: "builtin",
            handlers: RwLock::new(HashMap::new()),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_name(name: &'static str) -> Self {
        Self {
            name,
            handlers: RwLock::new(HashMap::new()),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Register a handler for a task type, replacing any previous one.
    pub fn register<F, Fut>(&self, task_type: impl Into<String>, handler: F) -> &Self
    where
        F: Fn(String, ExecOptions) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String, String>> + Send + 'static,
    {
        let task_type = task_type.into();
        let wrapped: Handler = Arc::new(move |prompt, opts| Box::pin(handler(prompt, opts)));
        self.handlers.write().unwrap().insert(task_type.clone(), wrapped);
        trace!(task_type, "handler registered");
        self
    }

    pub fn unregister(&self, task_type: &str) -> bool {
        self.handlers.write().unwrap().remove(task_type).is_some()
    }

    pub fn is_registered(&self, task_type: &str) -> bool {
        self.handlers.read().unwrap().contains_key(task_type)
    }

    pub fn count(&self) -> usize {
        self.handlers.read().unwrap().len()
    }
}

impl Default for BuiltinExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SubAgentExecutor for BuiltinExecutor {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn execute_sub_agent(
        &self,
        task_type: &str,
        prompt: &str,
        opts: ExecOptions,
    ) -> ExecOutcome {
        let start = Instant::now();
        let task_id = opts.task_id.clone();

        let handler = self.handlers.read().unwrap().get(task_type).cloned();
        let Some(handler) = handler else {
            return ExecOutcome::failure(
                task_id,
                ExecError::HandlerNotFound(task_type.to_string()).to_string(),
                start.elapsed().as_millis() as u64,
            );
        };

        let token = CancellationToken::new();
        self.in_flight
            .lock()
            .unwrap()
            .insert(task_id.clone(), token.clone());

        let fut = handler(prompt.to_string(), opts);
        let outcome = tokio::select! {
            res = fut => {
                let duration_ms = start.elapsed().as_millis() as u64;
                match res {
                    Ok(output) => ExecOutcome::success(task_id.clone(), Some(output), duration_ms),
                    Err(message) => ExecOutcome::failure(task_id.clone(), message, duration_ms),
                }
            }
            _ = token.cancelled() => {
                debug!(task = %task_id, "handler aborted");
                ExecOutcome::failure(
                    task_id.clone(),
                    ExecError::Cancelled.to_string(),
                    start.elapsed().as_millis() as u64,
                )
            }
        };

        self.in_flight.lock().unwrap().remove(&task_id);
        outcome
    }

    async fn cancel_sub_agent(&self, task_id: &TaskId) {
        // Remove, don't just signal: the engine may have stopped polling the
        // execute future, in which case its own cleanup never runs.
        if let Some(token) = self.in_flight.lock().unwrap().remove(task_id) {
            token.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use subtask_core::{EngineError, ExecutorRegistry, SubAgentEngine};
    use subtask_model::{EngineConfig, SubmitOptions, TaskStatus};

    #[test]
    fn register_and_unregister() {
        let executor = BuiltinExecutor::new();
        assert_eq!(executor.count(), 0);

        executor.register("summarize", |_prompt, _opts| async { Ok("ok".to_string()) });
        assert!(executor.is_registered("summarize"));
        assert_eq!(executor.count(), 1);

        // Re-registering replaces, not duplicates.
        executor.register("summarize", |_prompt, _opts| async { Ok("v2".to_string()) });
        assert_eq!(executor.count(), 1);

        assert!(executor.unregister("summarize"));
        assert!(!executor.unregister("summarize"));
        assert_eq!(executor.count(), 0);
    }

    #[tokio::test]
    async fn engine_runs_registered_handler() {
        let executor = Arc::new(BuiltinExecutor::new());
        executor.register("summarize", |prompt, _opts| async move {
            Ok(format!("summary of {} bytes", prompt.len()))
        });

        let registry = ExecutorRegistry::new("builtin", executor.clone());
        let engine = SubAgentEngine::builder(EngineConfig::default(), registry).build();

        let result = engine
            .submit("a1", "summarize", "digest", "some text", SubmitOptions::new())
            .unwrap()
            .wait()
            .await;

        assert_eq!(result.status, TaskStatus::Succeeded);
        assert!(result.output.unwrap().starts_with("summary of"));
    }

    #[tokio::test]
    async fn unknown_task_type_fails_without_panicking() {
        let executor = Arc::new(BuiltinExecutor::new());
        let registry = ExecutorRegistry::new("builtin", executor);
        let engine = SubAgentEngine::builder(EngineConfig::default(), registry).build();

        let result = engine
            .submit("a1", "nope", "", "", SubmitOptions::new())
            .unwrap()
            .wait()
            .await;

        assert_eq!(result.status, TaskStatus::Failed);
        assert!(result.error.unwrap().contains("no handler registered"));
    }

    #[tokio::test]
    async fn handler_error_becomes_failed_outcome() {
        let executor = Arc::new(BuiltinExecutor::new());
        executor.register("flaky", |_prompt, _opts| async { Err("backend offline".to_string()) });

        let registry = ExecutorRegistry::new("builtin", executor);
        let engine = SubAgentEngine::builder(EngineConfig::default(), registry).build();

        let result = engine
            .submit("a1", "flaky", "", "", SubmitOptions::new())
            .unwrap()
            .wait()
            .await;

        assert_eq!(result.status, TaskStatus::Failed);
        assert_eq!(result.error.as_deref(), Some("backend offline"));
    }

    #[tokio::test]
    async fn structured_handler_output_reaches_caller_extracted() {
        let executor = Arc::new(BuiltinExecutor::new());
        executor.register("review", |_prompt, _opts| async {
            let payload = serde_json::json!({ "result": "two nits, both minor" });
            Ok(payload.to_string())
        });

        let registry = ExecutorRegistry::new("builtin", executor);
        let engine = SubAgentEngine::builder(EngineConfig::default(), registry).build();

        let result = engine
            .submit("a1", "review", "", "", SubmitOptions::new())
            .unwrap()
            .wait()
            .await;

        assert_eq!(result.output.as_deref(), Some("two nits, both minor"));
    }

    #[tokio::test]
    async fn cancel_aborts_in_flight_handler() {
        let executor = Arc::new(BuiltinExecutor::new());
        executor.register("slow", |_prompt, _opts| async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok("too late".to_string())
        });

        let registry = ExecutorRegistry::new("builtin", executor);
        let engine = SubAgentEngine::builder(EngineConfig::default(), registry).build();

        let submission = engine
            .submit("a1", "slow", "", "", SubmitOptions::new())
            .unwrap();
        let task_id = submission.task_id().clone();

        tokio::task::yield_now().await;
        engine.cancel(&task_id).unwrap();

        let result = tokio::time::timeout(Duration::from_secs(5), submission.wait())
            .await
            .expect("cancelled submission must settle promptly");
        assert_eq!(result.status, TaskStatus::Cancelled);
        assert!(matches!(
            engine.cancel(&task_id),
            Err(EngineError::NotFound(_))
        ));
    }
}
