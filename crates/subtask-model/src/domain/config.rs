use serde::{Deserialize, Serialize};

use crate::TimeoutMs;

/// Configuration surface consumed by the engine.
///
/// Loading and persistence belong to the host; the engine only reads these
/// values, at construction and again on [`apply`]-style updates. New limits
/// affect subsequent admission decisions only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    /// Global ceiling on simultaneously executing tasks.
    #[serde(default = "default_max_concurrent_tasks")]
    pub max_concurrent_tasks: usize,
    /// Per-agent bound on `active + queued` backlog.
    #[serde(default = "default_max_tasks_per_agent")]
    pub max_tasks_per_agent: usize,
    /// Timeout applied when a submission carries none.
    #[serde(default = "default_timeout_ms")]
    pub default_timeout_ms: TimeoutMs,
    /// Executor selector resolved through the registry.
    #[serde(default = "default_executor")]
    pub executor: String,
}

fn default_max_concurrent_tasks() -> usize {
    10
}

fn default_max_tasks_per_agent() -> usize {
    3
}

fn default_timeout_ms() -> TimeoutMs {
    300_000
}

fn default_executor() -> String {
    "builtin".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: default_max_concurrent_tasks(),
            max_tasks_per_agent: default_max_tasks_per_agent(),
            default_timeout_ms: default_timeout_ms(),
            executor: default_executor(),
        }
    }
}
