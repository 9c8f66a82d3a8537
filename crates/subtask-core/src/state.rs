use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use subtask_model::{AgentId, TaskId, TaskPage, TaskQuery, TaskRequest, TaskResult, TaskStatus};

use crate::executor::SubAgentExecutor;

/// A task currently executing.
pub(crate) struct ActiveEntry {
    pub request: TaskRequest,
    pub cancel: CancellationToken,
    /// The executor this task started on; cancellation must target it even
    /// if configuration re-selected another one since.
    pub executor: Arc<dyn SubAgentExecutor>,
    /// When the request was accepted (cancellation measures from here).
    pub submitted: Instant,
    /// When execution began.
    pub started: Instant,
    pub waiter: Option<oneshot::Sender<TaskResult>>,
}

/// A task waiting in its agent's FIFO queue.
pub(crate) struct QueuedEntry {
    pub request: TaskRequest,
    pub submitted: Instant,
    pub waiter: oneshot::Sender<TaskResult>,
}

/// In-memory bookkeeping for all live tasks.
///
/// The one-active-task-per-agent invariant is structural: the active index
/// maps each agent to at most one task id. All mutation happens under the
/// engine's lock; this type itself is plain data.
#[derive(Default)]
pub(crate) struct TaskLedger {
    active: HashMap<TaskId, ActiveEntry>,
    active_by_agent: HashMap<AgentId, TaskId>,
    queues: HashMap<AgentId, VecDeque<QueuedEntry>>,
    lifetime: HashMap<AgentId, u64>,
}

impl TaskLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Active (0 or 1) plus queued count for one agent.
    pub fn backlog(&self, agent: &str) -> usize {
        let active = usize::from(self.active_by_agent.contains_key(agent));
        let queued = self.queues.get(agent).map_or(0, VecDeque::len);
        active + queued
    }

    pub fn is_idle(&self, agent: &str) -> bool {
        !self.active_by_agent.contains_key(agent)
    }

    pub fn record_accepted(&mut self, agent: &str) {
        *self.lifetime.entry(agent.to_string()).or_default() += 1;
    }

    pub fn lifetime_total(&self, agent: &str) -> u64 {
        self.lifetime.get(agent).copied().unwrap_or(0)
    }

    pub fn insert_active(&mut self, entry: ActiveEntry) {
        let agent = entry.request.agent_id.clone();
        let id = entry.request.id.clone();
        debug_assert!(
            !self.active_by_agent.contains_key(&agent),
            "agent already has an active task"
        );
        self.active_by_agent.insert(agent, id.clone());
        self.active.insert(id, entry);
    }

    /// Removes and returns the entry; the gate for exactly-once settlement.
    pub fn remove_active(&mut self, id: &TaskId) -> Option<ActiveEntry> {
        let entry = self.active.remove(id)?;
        self.active_by_agent.remove(&entry.request.agent_id);
        Some(entry)
    }

    pub fn is_active(&self, id: &TaskId) -> bool {
        self.active.contains_key(id)
    }

    pub fn get_active(&self, id: &TaskId) -> Option<&ActiveEntry> {
        self.active.get(id)
    }

    pub fn enqueue(&mut self, entry: QueuedEntry) {
        self.queues
            .entry(entry.request.agent_id.clone())
            .or_default()
            .push_back(entry);
    }

    /// Pops the head of an agent's queue, dropping the queue once empty.
    pub fn dequeue(&mut self, agent: &str) -> Option<QueuedEntry> {
        let queue = self.queues.get_mut(agent)?;
        let entry = queue.pop_front();
        if queue.is_empty() {
            self.queues.remove(agent);
        }
        entry
    }

    /// Drains an agent's entire queue in FIFO order.
    pub fn take_queue(&mut self, agent: &str) -> Vec<QueuedEntry> {
        self.queues
            .remove(agent)
            .map(Vec::from)
            .unwrap_or_default()
    }

    /// Drains every queue; used at shutdown.
    pub fn take_all_queues(&mut self) -> Vec<QueuedEntry> {
        let mut out = Vec::new();
        for (_, queue) in std::mem::take(&mut self.queues) {
            out.extend(queue);
        }
        out
    }

    pub fn active_task_of(&self, agent: &str) -> Option<TaskId> {
        self.active_by_agent.get(agent).cloned()
    }

    pub fn active_ids(&self) -> Vec<TaskId> {
        self.active.keys().cloned().collect()
    }

    pub fn active_requests(&self, agent: &str) -> Vec<TaskRequest> {
        self.active_by_agent
            .get(agent)
            .and_then(|id| self.active.get(id))
            .map(|entry| vec![entry.request.clone()])
            .unwrap_or_default()
    }

    pub fn queued_requests(&self, agent: &str) -> Vec<TaskRequest> {
        self.queues
            .get(agent)
            .map(|queue| queue.iter().map(|e| e.request.clone()).collect())
            .unwrap_or_default()
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn queued_count(&self) -> usize {
        self.queues.values().map(VecDeque::len).sum()
    }

    pub fn find(&self, id: &TaskId) -> Option<(TaskRequest, TaskStatus)> {
        if let Some(entry) = self.active.get(id) {
            return Some((entry.request.clone(), TaskStatus::Active));
        }
        self.queues
            .values()
            .flat_map(|queue| queue.iter())
            .find(|entry| &entry.request.id == id)
            .map(|entry| (entry.request.clone(), TaskStatus::Queued))
    }

    /// Filters live tasks; `total` is the filtered count before pagination.
    pub fn query(&self, q: &TaskQuery) -> TaskPage<TaskRequest> {
        let want = |status: TaskStatus| q.status.is_none_or(|s| s == status);
        let agent_matches =
            |request: &TaskRequest| q.agent.as_deref().is_none_or(|a| a == request.agent_id);

        let mut filtered: Vec<&TaskRequest> = Vec::new();
        if want(TaskStatus::Active) {
            filtered.extend(
                self.active
                    .values()
                    .map(|e| &e.request)
                    .filter(|r| agent_matches(r)),
            );
        }
        if want(TaskStatus::Queued) {
            filtered.extend(
                self.queues
                    .values()
                    .flat_map(|queue| queue.iter().map(|e| &e.request))
                    .filter(|r| agent_matches(r)),
            );
        }

        let total = filtered.len();
        let items = filtered
            .into_iter()
            .skip(q.offset)
            .take(q.limit)
            .cloned()
            .collect();

        TaskPage { items, total }
    }
}
