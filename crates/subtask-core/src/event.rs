use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use subtask_model::{AgentId, ProgressEvent, TaskId};

/// What happened to a task (or to the engine as a whole).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineEventKind {
    /// Request accepted behind a busy agent.
    Queued,
    /// Request entered execution.
    Starting,
    Succeeded,
    Failed,
    TimedOut,
    Cancelled,
    /// Queued request dropped without ever executing.
    Discarded,
    /// Best-effort mid-execution signal.
    Progress,
    /// Submission refused at admission.
    Rejected,
    ConfigUpdated,
    Shutdown,
}

/// Flat lifecycle event; fields are populated per kind.
///
/// Counters (`active`, `queued`) are snapshots taken right after the
/// transition that produced the event.
#[derive(Debug, Clone)]
pub struct EngineEvent {
    pub kind: EngineEventKind,
    pub task: Option<TaskId>,
    pub agent: Option<AgentId>,
    pub task_type: Option<String>,
    pub reason: Option<String>,
    pub percent: Option<u8>,
    pub duration_ms: Option<u64>,
    pub timeout_ms: Option<u64>,
    pub active: Option<u64>,
    pub queued: Option<u64>,
}

impl EngineEvent {
    pub fn new(kind: EngineEventKind) -> Self {
        Self {
            kind,
            task: None,
            agent: None,
            task_type: None,
            reason: None,
            percent: None,
            duration_ms: None,
            timeout_ms: None,
            active: None,
            queued: None,
        }
    }
}

impl From<ProgressEvent> for EngineEvent {
    fn from(progress: ProgressEvent) -> Self {
        let mut event = EngineEvent::new(EngineEventKind::Progress);
        event.task = Some(progress.task_id);
        event.agent = Some(progress.agent_id);
        event.percent = Some(progress.percent);
        event.reason = Some(progress.message);
        event
    }
}

/// Observer of engine lifecycle events.
///
/// Subscribers are registered at build time and served sequentially by a
/// dedicated dispatcher task; a slow subscriber delays other subscribers but
/// never an engine transition.
#[async_trait]
pub trait Subscribe: Send + Sync {
    async fn on_event(&self, event: &EngineEvent);

    fn name(&self) -> &'static str {
        "anonymous"
    }
}

/// Fan-out channel between the engine's transition handlers and subscribers.
pub(crate) struct EventBus {
    tx: mpsc::UnboundedSender<EngineEvent>,
}

impl EventBus {
    /// Spawns the dispatcher task. Must be called within a Tokio runtime.
    pub(crate) fn start(subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<EngineEvent>();

        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                for sub in &subscribers {
                    sub.on_event(&event).await;
                }
            }
        });

        Self { tx }
    }

    /// Non-blocking; events for a closed dispatcher are silently dropped.
    pub(crate) fn emit(&self, event: EngineEvent) {
        let _ = self.tx.send(event);
    }

    pub(crate) fn sender(&self) -> mpsc::UnboundedSender<EngineEvent> {
        self.tx.clone()
    }
}

/// Handle executors use to surface progress for one task.
///
/// Purely observational; reports after the task settled are dropped by
/// subscribers that care and harmless otherwise.
#[derive(Debug, Clone)]
pub struct ProgressSink {
    task_id: TaskId,
    agent_id: AgentId,
    tx: mpsc::UnboundedSender<EngineEvent>,
}

impl ProgressSink {
    pub(crate) fn new(
        task_id: TaskId,
        agent_id: AgentId,
        tx: mpsc::UnboundedSender<EngineEvent>,
    ) -> Self {
        Self { task_id, agent_id, tx }
    }

    pub fn report(&self, percent: u8, message: impl Into<String>) {
        let progress =
            ProgressEvent::new(self.task_id.clone(), self.agent_id.clone(), percent, message);
        let _ = self.tx.send(progress.into());
    }
}
