use serde::{Deserialize, Serialize};

/// Process-wide aggregate over all agents.
///
/// `total` counts terminal outcomes of tasks that entered execution; queued
/// requests discarded by `cancel_all` or shutdown count only into
/// `discarded`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Statistics {
    pub total: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub timed_out: u64,
    pub cancelled: u64,
    pub discarded: u64,
    /// Tasks executing right now.
    pub active: u64,
    /// Requests waiting across all agent queues.
    pub queued: u64,
    /// Rolling average over the most recent 100 completions.
    pub avg_execution_ms: f64,
}

/// Per-agent view, derived on demand from the live sets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentStats {
    pub active: usize,
    pub queued: usize,
    /// Accepted submissions over the engine's lifetime.
    pub lifetime_total: u64,
}
