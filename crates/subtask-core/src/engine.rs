use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime};

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use subtask_model::{
    AgentId, AgentStats, EngineConfig, Statistics, SubmitOptions, TaskId, TaskPage, TaskQuery,
    TaskRequest, TaskResult, TaskStatus,
};

use crate::error::EngineError;
use crate::event::{EngineEvent, EngineEventKind, EventBus, ProgressSink, Subscribe};
use crate::executor::{ExecOptions, ExecOutcome, SubAgentExecutor};
use crate::registry::ExecutorRegistry;
use crate::state::{ActiveEntry, QueuedEntry, TaskLedger};
use crate::stats::StatsRecorder;

/// Handle returned by [`SubAgentEngine::submit`].
///
/// Resolves to the task's terminal [`TaskResult`] whenever it later
/// completes; dropping it does not affect the task.
#[derive(Debug)]
pub struct Submission {
    task_id: TaskId,
    agent_id: AgentId,
    task_type: String,
    rx: oneshot::Receiver<TaskResult>,
}

impl Submission {
    pub fn task_id(&self) -> &TaskId {
        &self.task_id
    }

    /// Wait for the terminal result.
    ///
    /// If the engine is torn down without settling the task, a synthesized
    /// Cancelled result is returned so callers are never left hanging.
    pub async fn wait(self) -> TaskResult {
        match self.rx.await {
            Ok(result) => result,
            Err(_) => TaskResult {
                id: self.task_id,
                agent_id: self.agent_id,
                task_type: self.task_type,
                status: TaskStatus::Cancelled,
                output: None,
                error: Some("engine dropped before delivering a result".to_string()),
                execution_time_ms: 0,
                completed_at: SystemTime::now(),
                metadata: None,
            },
        }
    }
}

/// Why a task is being settled.
enum Disposition {
    /// The executor reported an outcome (success or failure).
    Finished(ExecOutcome),
    /// The engine-side timer fired first.
    TimedOut,
    /// Explicit cancellation (caller, cancel_all or shutdown).
    Cancelled { reason: String },
}

struct Inner {
    ledger: TaskLedger,
    stats: StatsRecorder,
    config: EngineConfig,
    registry: ExecutorRegistry,
    executor: Arc<dyn SubAgentExecutor>,
    shut_down: bool,
}

struct Shared {
    inner: Mutex<Inner>,
    events: EventBus,
}

/// Builder for [`SubAgentEngine`].
pub struct SubAgentEngineBuilder {
    config: EngineConfig,
    registry: ExecutorRegistry,
    subscribers: Vec<Arc<dyn Subscribe>>,
}

impl SubAgentEngineBuilder {
    pub fn with_subscriber(mut self, subscriber: Arc<dyn Subscribe>) -> Self {
        self.subscribers.push(subscriber);
        self
    }

    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers.extend(subscribers);
        self
    }

    /// Must be called within a Tokio runtime (spawns the event dispatcher).
    pub fn build(self) -> SubAgentEngine {
        let executor = self.registry.select(&self.config.executor);
        info!(executor = executor.name(), "sub-agent engine starting");

        let events = EventBus::start(self.subscribers);
        SubAgentEngine {
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    ledger: TaskLedger::new(),
                    stats: StatsRecorder::new(),
                    config: self.config,
                    registry: self.registry,
                    executor,
                    shut_down: false,
                }),
                events,
            }),
        }
    }
}

/// Orchestrates delegated sub-agent tasks across many requesting agents.
///
/// Guarantees: at most one task per agent executing at any instant, strict
/// per-agent FIFO, bounded backlog, and exactly one terminal result per
/// accepted submission. All bookkeeping mutations run inside one lock with
/// no await points, so no two transitions ever interleave partially.
#[derive(Clone)]
pub struct SubAgentEngine {
    shared: Arc<Shared>,
}

impl SubAgentEngine {
    pub fn builder(config: EngineConfig, registry: ExecutorRegistry) -> SubAgentEngineBuilder {
        SubAgentEngineBuilder {
            config,
            registry,
            subscribers: Vec::new(),
        }
    }

    /// Admit one unit of work for an agent.
    ///
    /// Returns immediately: if the agent is idle the task starts executing,
    /// otherwise it joins the agent's FIFO queue. The returned
    /// [`Submission`] resolves when the task reaches a terminal state.
    #[instrument(level = "debug", name = "submit", skip_all, fields(agent = %agent_id.as_ref()))]
    pub fn submit(
        &self,
        agent_id: impl AsRef<str>,
        task_type: impl Into<String>,
        description: impl Into<String>,
        prompt: impl Into<String>,
        options: SubmitOptions,
    ) -> Result<Submission, EngineError> {
        let agent_id = agent_id.as_ref().to_string();
        let task_type = task_type.into();

        let mut inner = self.shared.inner.lock().unwrap();
        if inner.shut_down {
            return Err(EngineError::ShuttingDown);
        }
        if !inner.executor.supports_sub_agents() {
            return Err(EngineError::ExecutorUnsupported(
                inner.executor.name().to_string(),
            ));
        }

        if inner.ledger.backlog(&agent_id) >= inner.config.max_tasks_per_agent {
            let reason = format!(
                "agent '{agent_id}' reached max concurrent tasks limit ({})",
                inner.config.max_tasks_per_agent
            );
            self.emit_rejected(&agent_id, &task_type, &reason);
            return Err(EngineError::AdmissionRejected(reason));
        }

        let idle = inner.ledger.is_idle(&agent_id);
        if idle && inner.ledger.active_count() >= inner.config.max_concurrent_tasks {
            let reason = format!(
                "global limit of {} active tasks reached",
                inner.config.max_concurrent_tasks
            );
            self.emit_rejected(&agent_id, &task_type, &reason);
            return Err(EngineError::AdmissionRejected(reason));
        }

        let request = TaskRequest {
            id: TaskId::from(Uuid::new_v4().to_string()),
            agent_id: agent_id.clone(),
            task_type: task_type.clone(),
            description: description.into(),
            prompt: prompt.into(),
            priority: options.priority.unwrap_or(0),
            timeout_ms: options
                .timeout_ms
                .unwrap_or(inner.config.default_timeout_ms),
            working_dir: options.working_dir,
            context: options.context.unwrap_or_default(),
            created_at: SystemTime::now(),
        };

        let (tx, rx) = oneshot::channel();
        let submission = Submission {
            task_id: request.id.clone(),
            agent_id: agent_id.clone(),
            task_type,
            rx,
        };

        inner.ledger.record_accepted(&agent_id);
        let submitted = Instant::now();

        if idle {
            start_task(&self.shared, &mut inner, request, tx, submitted);
        } else {
            inner.ledger.enqueue(QueuedEntry {
                request: request.clone(),
                submitted,
                waiter: tx,
            });
            debug!(task = %request.id, position = inner.ledger.backlog(&agent_id), "queued behind busy agent");
            let event = lifecycle_event(EngineEventKind::Queued, &request, &inner.ledger);
            self.shared.events.emit(event);
        }

        Ok(submission)
    }

    /// Cancel one currently executing task.
    ///
    /// Settles the result synchronously (`execution_time_ms` measured from
    /// original submission) and promotes the agent's queue head; the
    /// executor's teardown proceeds asynchronously and any late signal from
    /// it is discarded.
    pub fn cancel(&self, task_id: &TaskId) -> Result<(), EngineError> {
        let mut inner = self.shared.inner.lock().unwrap();
        if !inner.ledger.is_active(task_id) {
            return Err(EngineError::NotFound(task_id.clone()));
        }
        settle_locked(
            &self.shared,
            &mut inner,
            task_id,
            Disposition::Cancelled {
                reason: "cancelled by caller".to_string(),
            },
        );
        Ok(())
    }

    /// Cancel an agent's active task and discard its entire queue.
    ///
    /// Discarded requests never reach the executor and count only into the
    /// `discarded` statistic; their waiters settle with a Cancelled result.
    pub fn cancel_all(&self, agent_id: &str) {
        let mut inner = self.shared.inner.lock().unwrap();

        // Drain the queue first so settling the active task promotes nothing.
        let drained = inner.ledger.take_queue(agent_id);
        let discarded = drained.len() as u64;
        if discarded > 0 {
            inner.stats.record_discarded(discarded);
        }
        for entry in drained {
            let event = lifecycle_event(EngineEventKind::Discarded, &entry.request, &inner.ledger);
            self.shared.events.emit(event);
            let _ = entry.waiter.send(discard_result(entry.request, entry.submitted));
        }

        if let Some(task_id) = inner.ledger.active_task_of(agent_id) {
            settle_locked(
                &self.shared,
                &mut inner,
                &task_id,
                Disposition::Cancelled {
                    reason: "cancelled by cancel_all".to_string(),
                },
            );
        }
    }

    pub fn get_active(&self, agent_id: &str) -> Vec<TaskRequest> {
        self.shared.inner.lock().unwrap().ledger.active_requests(agent_id)
    }

    pub fn get_queued(&self, agent_id: &str) -> Vec<TaskRequest> {
        self.shared.inner.lock().unwrap().ledger.queued_requests(agent_id)
    }

    pub fn find_task(&self, task_id: &TaskId) -> Option<(TaskRequest, TaskStatus)> {
        self.shared.inner.lock().unwrap().ledger.find(task_id)
    }

    pub fn query(&self, query: &TaskQuery) -> TaskPage<TaskRequest> {
        self.shared.inner.lock().unwrap().ledger.query(query)
    }

    pub fn stats(&self) -> Statistics {
        let inner = self.shared.inner.lock().unwrap();
        inner.stats.snapshot(
            inner.ledger.active_count() as u64,
            inner.ledger.queued_count() as u64,
        )
    }

    pub fn agent_stats(&self, agent_id: &str) -> AgentStats {
        let inner = self.shared.inner.lock().unwrap();
        AgentStats {
            active: inner.ledger.active_requests(agent_id).len(),
            queued: inner.ledger.queued_requests(agent_id).len(),
            lifetime_total: inner.ledger.lifetime_total(agent_id),
        }
    }

    /// Apply updated configuration without disturbing in-flight tasks.
    ///
    /// Limits and the default timeout affect subsequent admissions only; a
    /// changed executor selector is re-resolved through the registry for
    /// subsequent activations.
    pub fn apply_config(&self, config: EngineConfig) {
        let mut inner = self.shared.inner.lock().unwrap();
        if config.executor != inner.config.executor {
            inner.executor = inner.registry.select(&config.executor);
            info!(executor = inner.executor.name(), "executor selection updated");
        }
        inner.config = config;

        let mut event = EngineEvent::new(EngineEventKind::ConfigUpdated);
        event.reason = Some(format!(
            "maxConcurrentTasks={} maxTasksPerAgent={} defaultTimeoutMs={}",
            inner.config.max_concurrent_tasks,
            inner.config.max_tasks_per_agent,
            inner.config.default_timeout_ms
        ));
        self.shared.events.emit(event);
    }

    /// Emit a progress event for an active task. Returns `false` when the
    /// task is unknown or already settled.
    pub fn report_progress(&self, task_id: &TaskId, percent: u8, message: &str) -> bool {
        let inner = self.shared.inner.lock().unwrap();
        let Some(entry) = inner.ledger.get_active(task_id) else {
            return false;
        };

        let progress = subtask_model::ProgressEvent::new(
            task_id.clone(),
            entry.request.agent_id.clone(),
            percent,
            message,
        );
        let mut event = EngineEvent::from(progress);
        event.task_type = Some(entry.request.task_type.clone());
        self.shared.events.emit(event);
        true
    }

    /// Tear the engine down: every active task is cancelled, every queued
    /// request is discarded, and all subsequent submissions are refused.
    pub fn shutdown(&self) {
        let mut inner = self.shared.inner.lock().unwrap();
        if inner.shut_down {
            return;
        }
        inner.shut_down = true;

        let drained = inner.ledger.take_all_queues();
        let discarded = drained.len() as u64;
        if discarded > 0 {
            inner.stats.record_discarded(discarded);
        }
        for entry in drained {
            let event = lifecycle_event(EngineEventKind::Discarded, &entry.request, &inner.ledger);
            self.shared.events.emit(event);
            let _ = entry.waiter.send(discard_result(entry.request, entry.submitted));
        }

        for task_id in inner.ledger.active_ids() {
            settle_locked(
                &self.shared,
                &mut inner,
                &task_id,
                Disposition::Cancelled {
                    reason: "engine shutdown".to_string(),
                },
            );
        }

        info!("sub-agent engine shut down");
        self.shared.events.emit(EngineEvent::new(EngineEventKind::Shutdown));
    }

    fn emit_rejected(&self, agent_id: &str, task_type: &str, reason: &str) {
        warn!(agent = agent_id, reason, "submission rejected");
        let mut event = EngineEvent::new(EngineEventKind::Rejected);
        event.agent = Some(agent_id.to_string());
        event.task_type = Some(task_type.to_string());
        event.reason = Some(reason.to_string());
        self.shared.events.emit(event);
    }
}

/// Transition a request into Active and spawn its runner.
///
/// Callers hold the engine lock; nothing here awaits.
fn start_task(
    shared: &Arc<Shared>,
    inner: &mut Inner,
    request: TaskRequest,
    waiter: oneshot::Sender<TaskResult>,
    submitted: Instant,
) {
    let cancel = CancellationToken::new();
    let timeout = Duration::from_millis(request.timeout_ms);
    let executor = Arc::clone(&inner.executor);

    inner.ledger.insert_active(ActiveEntry {
        request: request.clone(),
        cancel: cancel.clone(),
        executor: Arc::clone(&executor),
        submitted,
        started: Instant::now(),
        waiter: Some(waiter),
    });

    debug!(task = %request.id, agent = %request.agent_id, "task starting");
    let mut event = lifecycle_event(EngineEventKind::Starting, &request, &inner.ledger);
    event.timeout_ms = Some(request.timeout_ms);
    shared.events.emit(event);

    tokio::spawn(run_task(
        Arc::clone(shared),
        executor,
        request,
        cancel,
        timeout,
    ));
}

/// Drive one task to its terminal outcome.
///
/// Whichever of "executor settles", "timer fires" or "token cancelled" wins
/// the race reports through [`settle_locked`], whose remove-from-active gate
/// makes the first signal the sole source of truth.
async fn run_task(
    shared: Arc<Shared>,
    executor: Arc<dyn SubAgentExecutor>,
    request: TaskRequest,
    cancel: CancellationToken,
    timeout: Duration,
) {
    let prompt = assemble_prompt(&request);
    let opts = ExecOptions {
        task_id: request.id.clone(),
        timeout,
        priority: request.priority,
        context: request.context.clone(),
        working_dir: request.working_dir.clone(),
        progress: ProgressSink::new(
            request.id.clone(),
            request.agent_id.clone(),
            shared.events.sender(),
        ),
    };

    let exec = executor.execute_sub_agent(&request.task_type, &prompt, opts);
    tokio::pin!(exec);

    let disposition = tokio::select! {
        outcome = &mut exec => Disposition::Finished(outcome),
        _ = cancel.cancelled() => {
            // Already settled by cancel/cancel_all/shutdown; teardown was
            // requested there as well.
            return;
        }
        _ = tokio::time::sleep(timeout) => {
            debug!(task = %request.id, timeout_ms = request.timeout_ms, "timeout fired; aborting execution");
            executor.cancel_sub_agent(&request.id).await;
            Disposition::TimedOut
        }
    };

    let mut inner = shared.inner.lock().unwrap();
    settle_locked(&shared, &mut inner, &request.id, disposition);
}

/// Single settlement path for every terminal transition.
///
/// Removes the task from the active set (the exactly-once gate), records
/// statistics, resolves the waiter, emits the terminal event and promotes
/// the agent's queue head. A task id no longer in the active set means the
/// race was already won by another signal; the call is a no-op.
fn settle_locked(shared: &Arc<Shared>, inner: &mut Inner, task_id: &TaskId, disposition: Disposition) {
    let Some(mut entry) = inner.ledger.remove_active(task_id) else {
        return;
    };
    let request = &entry.request;

    let (status, output, error, execution_time_ms) = match disposition {
        Disposition::Finished(outcome) if outcome.success => (
            TaskStatus::Succeeded,
            Some(extract_output(outcome.result.unwrap_or_default())),
            None,
            entry.started.elapsed().as_millis() as u64,
        ),
        Disposition::Finished(outcome) => (
            TaskStatus::Failed,
            None,
            Some(
                outcome
                    .error
                    .unwrap_or_else(|| "executor reported failure".to_string()),
            ),
            entry.started.elapsed().as_millis() as u64,
        ),
        Disposition::TimedOut => (
            TaskStatus::TimedOut,
            None,
            Some(format!("timed out after {}ms", request.timeout_ms)),
            entry.started.elapsed().as_millis() as u64,
        ),
        Disposition::Cancelled { reason } => {
            entry.cancel.cancel();
            let executor = Arc::clone(&entry.executor);
            let id = request.id.clone();
            tokio::spawn(async move {
                executor.cancel_sub_agent(&id).await;
            });
            (
                TaskStatus::Cancelled,
                None,
                Some(reason),
                entry.submitted.elapsed().as_millis() as u64,
            )
        }
    };

    inner.stats.record_terminal(status, execution_time_ms);

    let kind = match status {
        TaskStatus::Succeeded => EngineEventKind::Succeeded,
        TaskStatus::Failed => EngineEventKind::Failed,
        TaskStatus::TimedOut => EngineEventKind::TimedOut,
        _ => EngineEventKind::Cancelled,
    };
    let mut event = lifecycle_event(kind, request, &inner.ledger);
    event.reason = error.clone();
    event.duration_ms = Some(execution_time_ms);
    if status == TaskStatus::TimedOut {
        event.timeout_ms = Some(request.timeout_ms);
    }
    shared.events.emit(event);

    let result = TaskResult {
        id: request.id.clone(),
        agent_id: request.agent_id.clone(),
        task_type: request.task_type.clone(),
        status,
        output,
        error,
        execution_time_ms,
        completed_at: SystemTime::now(),
        metadata: None,
    };

    let agent_id = request.agent_id.clone();
    if let Some(waiter) = entry.waiter.take() {
        let _ = waiter.send(result);
    }

    // Forward progress: the freed slot goes to the agent's oldest queued
    // request, without any external poll.
    if let Some(next) = inner.ledger.dequeue(&agent_id) {
        start_task(shared, inner, next.request, next.waiter, next.submitted);
    }
}

/// Result for a queued request dropped without ever executing.
fn discard_result(request: TaskRequest, submitted: Instant) -> TaskResult {
    TaskResult {
        id: request.id,
        agent_id: request.agent_id,
        task_type: request.task_type,
        status: TaskStatus::Cancelled,
        output: None,
        error: Some("discarded before execution".to_string()),
        execution_time_ms: submitted.elapsed().as_millis() as u64,
        completed_at: SystemTime::now(),
        metadata: None,
    }
}

fn lifecycle_event(kind: EngineEventKind, request: &TaskRequest, ledger: &TaskLedger) -> EngineEvent {
    let mut event = EngineEvent::new(kind);
    event.task = Some(request.id.clone());
    event.agent = Some(request.agent_id.clone());
    event.task_type = Some(request.task_type.clone());
    event.active = Some(ledger.active_count() as u64);
    event.queued = Some(ledger.queued_count() as u64);
    event
}

/// The executor sees one fully assembled prompt: type, description, context,
/// then the raw payload.
fn assemble_prompt(request: &TaskRequest) -> String {
    let mut prompt = format!("[{}] {}", request.task_type, request.description);
    if !request.context.is_empty() {
        prompt.push_str("\n\nContext:");
        for kv in request.context.iter() {
            prompt.push_str(&format!("\n- {}: {}", kv.key(), kv.value()));
        }
    }
    prompt.push_str("\n\n");
    prompt.push_str(&request.prompt);
    prompt
}

/// Structured executor payloads carry their text under a well-known field;
/// anything else passes through verbatim.
fn extract_output(raw: String) -> String {
    if let Ok(serde_json::Value::Object(map)) = serde_json::from_str::<serde_json::Value>(&raw) {
        for key in ["result", "content", "output"] {
            if let Some(serde_json::Value::String(s)) = map.get(key) {
                return s.clone();
            }
        }
    }
    raw
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use subtask_model::TaskContext;

    /// Behavior is driven by `task_type`; delays come from the task context.
    struct ScriptedExecutor {
        supported: bool,
        label: &'static str,
        calls: AtomicUsize,
        cancelled: Mutex<Vec<TaskId>>,
    }

    impl ScriptedExecutor {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                supported: true,
                label: "scripted",
                calls: AtomicUsize::new(0),
                cancelled: Mutex::new(Vec::new()),
            })
        }

        fn unsupported() -> Arc<Self> {
            Arc::new(Self {
                supported: false,
                label: "scripted-unsupported",
                calls: AtomicUsize::new(0),
                cancelled: Mutex::new(Vec::new()),
            })
        }

        fn labelled(label: &'static str) -> Arc<Self> {
            Arc::new(Self {
                supported: true,
                label,
                calls: AtomicUsize::new(0),
                cancelled: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SubAgentExecutor for ScriptedExecutor {
        fn name(&self) -> &'static str {
            self.label
        }

        fn supports_sub_agents(&self) -> bool {
            self.supported
        }

        async fn execute_sub_agent(
            &self,
            task_type: &str,
            prompt: &str,
            opts: ExecOptions,
        ) -> ExecOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let delay = opts
                .context
                .get("delay_ms")
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(0);
            if delay > 0 {
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
            match task_type {
                "ok" => ExecOutcome::success(opts.task_id, Some("done".to_string()), delay),
                "echo" => ExecOutcome::success(opts.task_id, Some(prompt.to_string()), delay),
                "json" => ExecOutcome::success(
                    opts.task_id,
                    Some(r#"{"result":"structured","model":"sub"}"#.to_string()),
                    delay,
                ),
                "fail" => ExecOutcome::failure(opts.task_id, "boom", delay),
                "hang" => {
                    std::future::pending::<()>().await;
                    unreachable!()
                }
                other => ExecOutcome::failure(opts.task_id, format!("unknown type {other}"), 0),
            }
        }

        async fn cancel_sub_agent(&self, task_id: &TaskId) {
            self.cancelled.lock().unwrap().push(task_id.clone());
        }
    }

    fn engine_with(config: EngineConfig) -> (SubAgentEngine, Arc<ScriptedExecutor>) {
        let executor = ScriptedExecutor::new();
        let registry = ExecutorRegistry::new("builtin", executor.clone());
        let engine = SubAgentEngine::builder(config, registry).build();
        (engine, executor)
    }

    fn delayed(ms: u64) -> SubmitOptions {
        SubmitOptions::new().with_context(TaskContext::single("delay_ms", ms.to_string()))
    }

    struct Recorder(Mutex<Vec<EngineEventKind>>);

    #[async_trait]
    impl Subscribe for Recorder {
        async fn on_event(&self, event: &EngineEvent) {
            self.0.lock().unwrap().push(event.kind);
        }

        fn name(&self) -> &'static str {
            "recorder"
        }
    }

    #[tokio::test]
    async fn idle_agent_starts_immediately_and_succeeds() {
        let (engine, _) = engine_with(EngineConfig::default());

        let submission = engine
            .submit("a1", "ok", "unit of work", "do it", SubmitOptions::new())
            .unwrap();
        let result = submission.wait().await;

        assert_eq!(result.status, TaskStatus::Succeeded);
        assert_eq!(result.output.as_deref(), Some("done"));
        assert!(result.error.is_none());

        let stats = engine.stats();
        assert_eq!(stats.total, 1);
        assert_eq!(stats.succeeded, 1);
        assert_eq!(stats.active, 0);
        assert_eq!(stats.queued, 0);
    }

    #[tokio::test]
    async fn structured_payload_is_extracted() {
        let (engine, _) = engine_with(EngineConfig::default());
        let result = engine
            .submit("a1", "json", "", "", SubmitOptions::new())
            .unwrap()
            .wait()
            .await;
        assert_eq!(result.output.as_deref(), Some("structured"));
    }

    #[tokio::test]
    async fn prompt_carries_type_description_context_and_payload() {
        let (engine, _) = engine_with(EngineConfig::default());
        let opts = SubmitOptions::new().with_context(TaskContext::single("branch", "main"));
        let result = engine
            .submit("a1", "echo", "sum the diff", "raw payload", opts)
            .unwrap()
            .wait()
            .await;

        let prompt = result.output.unwrap();
        assert!(prompt.contains("[echo] sum the diff"));
        assert!(prompt.contains("branch: main"));
        assert!(prompt.ends_with("raw payload"));
    }

    #[tokio::test]
    async fn execution_failure_is_delivered_not_thrown() {
        let (engine, _) = engine_with(EngineConfig::default());
        let result = engine
            .submit("a1", "fail", "", "", SubmitOptions::new())
            .unwrap()
            .wait()
            .await;

        assert_eq!(result.status, TaskStatus::Failed);
        assert_eq!(result.error.as_deref(), Some("boom"));
        assert!(result.output.is_none());
        assert_eq!(engine.stats().failed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn busy_agent_queues_in_fifo_order() {
        let (engine, _) = engine_with(EngineConfig::default());

        let first = engine
            .submit("a1", "ok", "first", "", delayed(100))
            .unwrap();
        let second = engine.submit("a1", "ok", "second", "", SubmitOptions::new()).unwrap();
        let third = engine.submit("a1", "ok", "third", "", SubmitOptions::new()).unwrap();

        assert_eq!(engine.get_active("a1").len(), 1);
        let queued = engine.get_queued("a1");
        assert_eq!(queued.len(), 2);
        assert_eq!(&queued[0].id, second.task_id());
        assert_eq!(&queued[1].id, third.task_id());

        assert_eq!(first.wait().await.status, TaskStatus::Succeeded);
        assert_eq!(second.wait().await.status, TaskStatus::Succeeded);
        assert_eq!(third.wait().await.status, TaskStatus::Succeeded);

        let stats = engine.stats();
        assert_eq!(stats.succeeded, 3);
        assert_eq!(stats.active, 0);
        assert_eq!(stats.queued, 0);
    }

    #[tokio::test]
    async fn backlog_bound_rejects_excess_submission() {
        let config = EngineConfig {
            max_tasks_per_agent: 1,
            ..EngineConfig::default()
        };
        let (engine, _) = engine_with(config);

        let _held = engine.submit("a1", "hang", "", "", SubmitOptions::new()).unwrap();
        let err = engine
            .submit("a1", "ok", "", "", SubmitOptions::new())
            .unwrap_err();

        match err {
            EngineError::AdmissionRejected(reason) => {
                assert!(reason.contains("max concurrent tasks limit"));
            }
            other => panic!("expected AdmissionRejected, got {other:?}"),
        }

        // Other agents are unaffected.
        assert!(engine.submit("a2", "ok", "", "", SubmitOptions::new()).is_ok());
    }

    #[tokio::test]
    async fn backlog_bound_counts_queued_requests() {
        let (engine, _) = engine_with(EngineConfig::default());

        let _active = engine.submit("a1", "hang", "", "", SubmitOptions::new()).unwrap();
        let _q1 = engine.submit("a1", "ok", "", "", SubmitOptions::new()).unwrap();
        let _q2 = engine.submit("a1", "ok", "", "", SubmitOptions::new()).unwrap();

        assert!(matches!(
            engine.submit("a1", "ok", "", "", SubmitOptions::new()),
            Err(EngineError::AdmissionRejected(_))
        ));
        assert_eq!(engine.agent_stats("a1").lifetime_total, 3);
    }

    #[tokio::test]
    async fn global_ceiling_rejects_new_activations_only() {
        let config = EngineConfig {
            max_concurrent_tasks: 2,
            ..EngineConfig::default()
        };
        let (engine, _) = engine_with(config);

        let _a = engine.submit("a1", "hang", "", "", SubmitOptions::new()).unwrap();
        let _b = engine.submit("a2", "hang", "", "", SubmitOptions::new()).unwrap();

        // A third agent would need a third active slot.
        let err = engine
            .submit("a3", "ok", "", "", SubmitOptions::new())
            .unwrap_err();
        assert!(matches!(err, EngineError::AdmissionRejected(reason) if reason.contains("global")));

        // Queueing behind a busy agent adds no active task and is admitted.
        assert!(engine.submit("a1", "ok", "", "", SubmitOptions::new()).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_settles_task_and_aborts_executor() {
        let (engine, executor) = engine_with(EngineConfig::default());

        let submission = engine
            .submit(
                "a1",
                "hang",
                "",
                "",
                SubmitOptions::new().with_timeout_ms(50),
            )
            .unwrap();
        let task_id = submission.task_id().clone();
        let result = submission.wait().await;

        assert_eq!(result.status, TaskStatus::TimedOut);
        assert_eq!(result.error.as_deref(), Some("timed out after 50ms"));
        assert!(executor.cancelled.lock().unwrap().contains(&task_id));

        let stats = engine.stats();
        assert_eq!(stats.timed_out, 1);
        assert_eq!(stats.total, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn late_executor_success_after_timeout_is_ignored() {
        let (engine, _) = engine_with(EngineConfig::default());

        // Executor needs 200ms, timeout is 50ms.
        let result = engine
            .submit(
                "a1",
                "ok",
                "",
                "",
                delayed(200).with_timeout_ms(50),
            )
            .unwrap()
            .wait()
            .await;
        assert_eq!(result.status, TaskStatus::TimedOut);

        // Let the executor's sleep elapse; the outcome must not change.
        tokio::time::sleep(Duration::from_millis(400)).await;
        let stats = engine.stats();
        assert_eq!(stats.total, 1);
        assert_eq!(stats.timed_out, 1);
        assert_eq!(stats.succeeded, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn timed_out_task_promotes_queued_successor() {
        // T1 times out at 50ms while its executor still needs 200ms; T2 is
        // quick and must take over the freed slot.
        let (engine, _) = engine_with(EngineConfig::default());

        let t1 = engine
            .submit("a1", "ok", "t1", "", delayed(200).with_timeout_ms(50))
            .unwrap();
        let t2 = engine.submit("a1", "ok", "t2", "", SubmitOptions::new()).unwrap();

        assert_eq!(engine.get_active("a1").len(), 1);
        assert_eq!(engine.get_queued("a1").len(), 1);

        assert_eq!(t1.wait().await.status, TaskStatus::TimedOut);
        assert_eq!(t2.wait().await.status, TaskStatus::Succeeded);

        let stats = engine.stats();
        assert_eq!(stats.timed_out, 1);
        assert_eq!(stats.succeeded, 1);
        assert_eq!(stats.active, 0);
        assert_eq!(stats.queued, 0);
    }

    #[tokio::test]
    async fn cancel_settles_active_task_exactly_once() {
        let (engine, _) = engine_with(EngineConfig::default());

        let submission = engine.submit("a1", "hang", "", "", SubmitOptions::new()).unwrap();
        let task_id = submission.task_id().clone();

        engine.cancel(&task_id).unwrap();
        let result = submission.wait().await;
        assert_eq!(result.status, TaskStatus::Cancelled);

        // Second cancel and unknown ids both report NotFound.
        assert!(matches!(
            engine.cancel(&task_id),
            Err(EngineError::NotFound(_))
        ));
        assert!(matches!(
            engine.cancel(&TaskId::from("no-such-task")),
            Err(EngineError::NotFound(_))
        ));
        assert_eq!(engine.stats().cancelled, 1);
    }

    #[tokio::test]
    async fn cancel_all_discards_queue_without_executing() {
        let (engine, executor) = engine_with(EngineConfig::default());

        let active = engine.submit("a1", "hang", "", "", SubmitOptions::new()).unwrap();
        let q1 = engine.submit("a1", "ok", "", "", SubmitOptions::new()).unwrap();
        let q2 = engine.submit("a1", "ok", "", "", SubmitOptions::new()).unwrap();

        // Give the runner a chance to invoke the executor for the active task.
        tokio::task::yield_now().await;
        assert_eq!(executor.calls(), 1);

        engine.cancel_all("a1");

        assert_eq!(active.wait().await.status, TaskStatus::Cancelled);
        assert_eq!(q1.wait().await.status, TaskStatus::Cancelled);
        assert_eq!(q2.wait().await.status, TaskStatus::Cancelled);

        // The queued pair never reached the executor and never counted into
        // `total`.
        assert_eq!(executor.calls(), 1);
        let stats = engine.stats();
        assert_eq!(stats.cancelled, 1);
        assert_eq!(stats.discarded, 2);
        assert_eq!(stats.total, 1);
        assert_eq!(stats.active, 0);
        assert_eq!(stats.queued, 0);
        assert!(engine.get_queued("a1").is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn no_leaks_across_mixed_operations() {
        let (engine, _) = engine_with(EngineConfig::default());

        let check = |engine: &SubAgentEngine| {
            let stats = engine.stats();
            let accepted: u64 = ["a1", "a2"]
                .iter()
                .map(|a| engine.agent_stats(a).lifetime_total)
                .sum();
            let settled = stats.total + stats.discarded;
            assert_eq!(stats.active + stats.queued, accepted - settled);
        };

        let t1 = engine.submit("a1", "ok", "", "", delayed(50)).unwrap();
        let _t2 = engine.submit("a1", "hang", "", "", SubmitOptions::new()).unwrap();
        let t3 = engine.submit("a2", "fail", "", "", SubmitOptions::new()).unwrap();
        check(&engine);

        t1.wait().await;
        t3.wait().await;
        check(&engine);

        engine.cancel_all("a1");
        check(&engine);

        engine.shutdown();
        check(&engine);
    }

    #[tokio::test]
    async fn unsupported_executor_fails_fast_without_transitions() {
        let executor = ScriptedExecutor::unsupported();
        let registry = ExecutorRegistry::new("builtin", executor.clone());
        let engine = SubAgentEngine::builder(EngineConfig::default(), registry).build();

        let err = engine
            .submit("a1", "ok", "", "", SubmitOptions::new())
            .unwrap_err();
        assert!(matches!(err, EngineError::ExecutorUnsupported(_)));

        assert_eq!(executor.calls(), 0);
        assert_eq!(engine.agent_stats("a1").lifetime_total, 0);
        assert_eq!(engine.stats().total, 0);
    }

    #[tokio::test]
    async fn unknown_selector_falls_back_to_default_executor() {
        let executor = ScriptedExecutor::new();
        let registry = ExecutorRegistry::new("builtin", executor.clone());
        let config = EngineConfig {
            executor: "no-such-executor".to_string(),
            ..EngineConfig::default()
        };
        let engine = SubAgentEngine::builder(config, registry).build();

        let result = engine
            .submit("a1", "ok", "", "", SubmitOptions::new())
            .unwrap()
            .wait()
            .await;
        assert_eq!(result.status, TaskStatus::Succeeded);
        assert_eq!(executor.calls(), 1);
    }

    #[tokio::test]
    async fn apply_config_changes_limits_and_executor() {
        let primary = ScriptedExecutor::new();
        let secondary = ScriptedExecutor::labelled("secondary");
        let mut registry = ExecutorRegistry::new("builtin", primary.clone());
        registry.register("secondary", secondary.clone());

        let config = EngineConfig {
            max_tasks_per_agent: 1,
            ..EngineConfig::default()
        };
        let engine = SubAgentEngine::builder(config.clone(), registry).build();

        let _held = engine.submit("a1", "hang", "", "", SubmitOptions::new()).unwrap();
        assert!(engine.submit("a1", "ok", "", "", SubmitOptions::new()).is_err());

        engine.apply_config(EngineConfig {
            max_tasks_per_agent: 2,
            executor: "secondary".to_string(),
            ..config
        });

        // The raised limit admits a queued request now.
        let queued = engine.submit("a1", "ok", "", "", SubmitOptions::new()).unwrap();
        assert_eq!(engine.get_queued("a1").len(), 1);

        // New activations run on the newly selected executor.
        let result = engine
            .submit("a2", "ok", "", "", SubmitOptions::new())
            .unwrap()
            .wait()
            .await;
        assert_eq!(result.status, TaskStatus::Succeeded);
        assert_eq!(secondary.calls(), 1);

        drop(queued);
        engine.shutdown();
    }

    #[tokio::test]
    async fn shutdown_settles_active_and_queued_then_refuses() {
        let (engine, _) = engine_with(EngineConfig::default());

        let active = engine.submit("a1", "hang", "", "", SubmitOptions::new()).unwrap();
        let queued = engine.submit("a1", "ok", "", "", SubmitOptions::new()).unwrap();

        engine.shutdown();

        assert_eq!(active.wait().await.status, TaskStatus::Cancelled);
        let queued_result = queued.wait().await;
        assert_eq!(queued_result.status, TaskStatus::Cancelled);
        assert_eq!(
            queued_result.error.as_deref(),
            Some("discarded before execution")
        );

        assert!(matches!(
            engine.submit("a1", "ok", "", "", SubmitOptions::new()),
            Err(EngineError::ShuttingDown)
        ));

        // Idempotent.
        engine.shutdown();
        let stats = engine.stats();
        assert_eq!(stats.cancelled, 1);
        assert_eq!(stats.discarded, 1);
    }

    #[tokio::test]
    async fn find_and_query_report_live_statuses() {
        let (engine, _) = engine_with(EngineConfig::default());

        let active = engine.submit("a1", "hang", "", "", SubmitOptions::new()).unwrap();
        let queued = engine.submit("a1", "ok", "", "", SubmitOptions::new()).unwrap();

        assert_eq!(
            engine.find_task(active.task_id()).unwrap().1,
            TaskStatus::Active
        );
        assert_eq!(
            engine.find_task(queued.task_id()).unwrap().1,
            TaskStatus::Queued
        );
        assert!(engine.find_task(&TaskId::from("missing")).is_none());

        let page = engine.query(&TaskQuery::new().with_agent("a1"));
        assert_eq!(page.total, 2);

        engine.shutdown();
    }

    #[tokio::test]
    async fn progress_reports_only_for_active_tasks() {
        let (engine, _) = engine_with(EngineConfig::default());

        let active = engine.submit("a1", "hang", "", "", SubmitOptions::new()).unwrap();
        assert!(engine.report_progress(active.task_id(), 50, "halfway"));
        assert!(!engine.report_progress(&TaskId::from("missing"), 10, "nope"));

        engine.shutdown();
    }

    #[tokio::test]
    async fn subscribers_observe_lifecycle_in_order() {
        let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
        let executor = ScriptedExecutor::new();
        let registry = ExecutorRegistry::new("builtin", executor);
        let engine = SubAgentEngine::builder(EngineConfig::default(), registry)
            .with_subscriber(recorder.clone())
            .build();

        let first = engine.submit("a1", "ok", "", "", delayed(10)).unwrap();
        let second = engine.submit("a1", "ok", "", "", SubmitOptions::new()).unwrap();
        first.wait().await;
        second.wait().await;

        // Drain the dispatcher.
        tokio::time::sleep(Duration::from_millis(50)).await;

        let kinds = recorder.0.lock().unwrap().clone();
        assert_eq!(
            kinds,
            vec![
                EngineEventKind::Starting,
                EngineEventKind::Queued,
                EngineEventKind::Succeeded,
                EngineEventKind::Starting,
                EngineEventKind::Succeeded,
            ]
        );
    }
}
