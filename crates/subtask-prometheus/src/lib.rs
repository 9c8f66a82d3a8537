//! Prometheus metrics backend for the subtask engine.
//!
//! [`EngineMetrics`] subscribes to the engine's event stream and maintains:
//! - `subtask_tasks_started_total{task_type}` - Counter
//! - `subtask_tasks_completed_total{task_type, outcome}` - Counter
//! - `subtask_task_duration_seconds{task_type}` - Histogram
//! - `subtask_admission_rejected_total` - Counter
//! - `subtask_active_tasks` / `subtask_queued_tasks` - Gauges
//!
//! This crate does NOT provide an HTTP server for a `/metrics` endpoint.
//! Use your application's existing HTTP framework and encode the families
//! from [`EngineMetrics::gather`] with a [`prometheus::TextEncoder`].

mod backend;
pub use backend::EngineMetrics;

pub use prometheus::{Encoder, Registry, TextEncoder};
