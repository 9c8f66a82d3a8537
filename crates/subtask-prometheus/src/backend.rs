use async_trait::async_trait;
use prometheus::{
    HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    proto::MetricFamily,
};

use subtask_core::{EngineEvent, EngineEventKind, Subscribe};

/// Engine event subscriber backed by a dedicated Prometheus registry.
#[derive(Clone)]
pub struct EngineMetrics {
    registry: Registry,
    started: IntCounterVec,
    completed: IntCounterVec,
    duration: HistogramVec,
    rejected: IntCounter,
    active: IntGauge,
    queued: IntGauge,
}

impl EngineMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let started = IntCounterVec::new(
            Opts::new("subtask_tasks_started_total", "Tasks that entered execution"),
            &["task_type"],
        )?;
        let completed = IntCounterVec::new(
            Opts::new("subtask_tasks_completed_total", "Terminal task outcomes"),
            &["task_type", "outcome"],
        )?;
        let duration = HistogramVec::new(
            HistogramOpts::new("subtask_task_duration_seconds", "Task execution duration"),
            &["task_type"],
        )?;
        let rejected = IntCounter::new(
            "subtask_admission_rejected_total",
            "Submissions refused at admission",
        )?;
        let active = IntGauge::new("subtask_active_tasks", "Currently executing tasks")?;
        let queued = IntGauge::new("subtask_queued_tasks", "Requests waiting in agent queues")?;

        registry.register(Box::new(started.clone()))?;
        registry.register(Box::new(completed.clone()))?;
        registry.register(Box::new(duration.clone()))?;
        registry.register(Box::new(rejected.clone()))?;
        registry.register(Box::new(active.clone()))?;
        registry.register(Box::new(queued.clone()))?;

        Ok(Self {
            registry,
            started,
            completed,
            duration,
            rejected,
            active,
            queued,
        })
    }

    /// Snapshot all metric families for exposition.
    pub fn gather(&self) -> Vec<MetricFamily> {
        self.registry.gather()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    fn observe(&self, event: &EngineEvent) {
        let task_type = event.task_type.as_deref().unwrap_or("unknown");

        match event.kind {
            EngineEventKind::Starting => {
                self.started.with_label_values(&[task_type]).inc();
            }
            EngineEventKind::Succeeded
            | EngineEventKind::Failed
            | EngineEventKind::TimedOut
            | EngineEventKind::Cancelled
            | EngineEventKind::Discarded => {
                let outcome = match event.kind {
                    EngineEventKind::Succeeded => "succeeded",
                    EngineEventKind::Failed => "failed",
                    EngineEventKind::TimedOut => "timedOut",
                    EngineEventKind::Cancelled => "cancelled",
                    _ => "discarded",
                };
                self.completed
                    .with_label_values(&[task_type, outcome])
                    .inc();
                if let Some(ms) = event.duration_ms {
                    self.duration
                        .with_label_values(&[task_type])
                        .observe(ms as f64 / 1_000.0);
                }
            }
            EngineEventKind::Rejected => {
                self.rejected.inc();
            }
            EngineEventKind::Queued
            | EngineEventKind::Progress
            | EngineEventKind::ConfigUpdated
            | EngineEventKind::Shutdown => {}
        }

        // Lifecycle events carry post-transition snapshots; set, don't count.
        if let Some(active) = event.active {
            self.active.set(active as i64);
        }
        if let Some(queued) = event.queued {
            self.queued.set(queued as i64);
        }
    }
}

#[async_trait]
impl Subscribe for EngineMetrics {
    async fn on_event(&self, event: &EngineEvent) {
        self.observe(event);
    }

    fn name(&self) -> &'static str {
        "prometheus"
    }
}
