mod kv;
pub use kv::KeyValue;

mod task_context;
pub use task_context::TaskContext;

mod task_id;
pub use task_id::TaskId;

mod task_status;
pub use task_status::{ParseStatusError, TaskStatus};

mod task_request;
pub use task_request::{SubmitOptions, TaskRequest};

mod task_result;
pub use task_result::TaskResult;

mod progress;
pub use progress::ProgressEvent;

mod stats;
pub use stats::{AgentStats, Statistics};

mod task_query;
pub use task_query::{TaskPage, TaskQuery};

mod config;
pub use config::EngineConfig;

pub(crate) mod time_serde;

/// Logical identifier for a requesting agent.
///
/// An agent groups tasks that must not run concurrently: the engine keeps at
/// most one of its tasks active and bounds its backlog.
pub type AgentId = String;

/// Timeout value in milliseconds.
///
/// Used in submissions and configuration where an explicit time limit is
/// required.
pub type TimeoutMs = u64;
