use std::collections::VecDeque;

use subtask_model::{Statistics, TaskStatus};

/// Bounded sample window for the rolling execution-time average.
const SAMPLE_WINDOW: usize = 100;

/// Terminal counters plus the rolling average window.
#[derive(Default)]
pub(crate) struct StatsRecorder {
    total: u64,
    succeeded: u64,
    failed: u64,
    timed_out: u64,
    cancelled: u64,
    discarded: u64,
    samples: VecDeque<u64>,
}

impl StatsRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a terminal outcome of a task that entered execution.
    pub fn record_terminal(&mut self, status: TaskStatus, execution_ms: u64) {
        debug_assert!(status.is_terminal());
        self.total += 1;
        match status {
            TaskStatus::Succeeded => self.succeeded += 1,
            TaskStatus::Failed => self.failed += 1,
            TaskStatus::TimedOut => self.timed_out += 1,
            TaskStatus::Cancelled => self.cancelled += 1,
            TaskStatus::Queued | TaskStatus::Active => {}
        }

        self.samples.push_back(execution_ms);
        if self.samples.len() > SAMPLE_WINDOW {
            self.samples.pop_front();
        }
    }

    /// Record queued requests dropped without executing.
    pub fn record_discarded(&mut self, count: u64) {
        self.discarded += count;
    }

    pub fn snapshot(&self, active: u64, queued: u64) -> Statistics {
        let avg_execution_ms = if self.samples.is_empty() {
            0.0
        } else {
            self.samples.iter().sum::<u64>() as f64 / self.samples.len() as f64
        };

        Statistics {
            total: self.total,
            succeeded: self.succeeded,
            failed: self.failed,
            timed_out: self.timed_out,
            cancelled: self.cancelled,
            discarded: self.discarded,
            active,
            queued,
            avg_execution_ms,
        }
    }
}
