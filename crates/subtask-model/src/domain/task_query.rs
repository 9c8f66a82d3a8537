use crate::TaskStatus;

const DEFAULT_LIMIT: usize = 100;
const MAX_LIMIT: usize = 1000;

/// Query parameters for listing live tasks with filtering and pagination.
///
/// The engine keeps no terminal history, so only `Queued` and `Active`
/// status filters can match anything.
#[derive(Debug, Clone)]
pub struct TaskQuery {
    pub agent: Option<String>,
    pub status: Option<TaskStatus>,
    pub limit: usize,
    pub offset: usize,
}

/// Result of a paginated task query.
///
/// `total` reflects the count after filtering, before pagination.
#[derive(Debug, Clone)]
pub struct TaskPage<T> {
    pub items: Vec<T>,
    pub total: usize,
}

impl TaskQuery {
    pub fn new() -> Self {
        Self {
            agent: None,
            status: None,
            limit: DEFAULT_LIMIT,
            offset: 0,
        }
    }

    pub fn with_agent(mut self, agent: impl Into<String>) -> Self {
        self.agent = Some(agent.into());
        self
    }

    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit.min(MAX_LIMIT);
        self
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }
}

impl Default for TaskQuery {
    fn default() -> Self {
        Self::new()
    }
}
