use async_trait::async_trait;
use tracing::{debug, error, info, trace, warn};

use subtask_core::{EngineEvent, EngineEventKind, Subscribe};

/// Field accessors with stable fallbacks for logging.
trait View {
    fn as_task(&self) -> &str;
    fn as_agent(&self) -> &str;
    fn as_reason(&self) -> &str;
    fn percent(&self) -> u8;
    fn duration_ms(&self) -> u64;
    fn timeout_ms(&self) -> u64;
}

impl View for EngineEvent {
    #[inline]
    fn as_task(&self) -> &str {
        self.task.as_ref().map(|t| t.as_str()).unwrap_or("unknown")
    }
    #[inline]
    fn as_agent(&self) -> &str {
        self.agent.as_deref().unwrap_or("unknown")
    }
    #[inline]
    fn as_reason(&self) -> &str {
        self.reason.as_deref().unwrap_or("unknown")
    }
    #[inline]
    fn percent(&self) -> u8 {
        self.percent.unwrap_or(0)
    }
    #[inline]
    fn duration_ms(&self) -> u64 {
        self.duration_ms.unwrap_or(0)
    }
    #[inline]
    fn timeout_ms(&self) -> u64 {
        self.timeout_ms.unwrap_or(0)
    }
}

#[inline]
pub fn message_for(kind: EngineEventKind) -> &'static str {
    match kind {
        // admission
        EngineEventKind::Queued => "task queued behind busy agent",
        EngineEventKind::Rejected => "submission rejected at admission",

        // lifecycle
        EngineEventKind::Starting => "task is starting",
        EngineEventKind::Succeeded => "task completed successfully",
        EngineEventKind::Failed => "task failed",
        EngineEventKind::TimedOut => "task exceeded its configured timeout",
        EngineEventKind::Cancelled => "task cancelled",
        EngineEventKind::Discarded => "queued task discarded without executing",
        EngineEventKind::Progress => "task progress",

        // engine
        EngineEventKind::ConfigUpdated => "engine configuration updated",
        EngineEventKind::Shutdown => "engine shut down",
    }
}

#[inline]
pub fn log_event(e: &EngineEvent) {
    let msg = message_for(e.kind);

    match e.kind {
        // admission
        EngineEventKind::Queued => {
            debug!(task = e.as_task(), agent = e.as_agent(), "{msg}")
        }
        EngineEventKind::Rejected => {
            warn!(agent = e.as_agent(), reason = e.as_reason(), "{msg}")
        }

        // lifecycle
        EngineEventKind::Starting => {
            info!(task = e.as_task(), agent = e.as_agent(), timeout_ms = e.timeout_ms(), "{msg}")
        }
        EngineEventKind::Succeeded => {
            info!(task = e.as_task(), agent = e.as_agent(), duration_ms = e.duration_ms(), "{msg}")
        }
        EngineEventKind::Failed => error!(
            task = e.as_task(),
            agent = e.as_agent(),
            reason = e.as_reason(),
            "{msg}"
        ),
        EngineEventKind::TimedOut => {
            warn!(task = e.as_task(), agent = e.as_agent(), timeout_ms = e.timeout_ms(), "{msg}")
        }
        EngineEventKind::Cancelled => {
            info!(task = e.as_task(), agent = e.as_agent(), reason = e.as_reason(), "{msg}")
        }
        EngineEventKind::Discarded => {
            debug!(task = e.as_task(), agent = e.as_agent(), "{msg}")
        }
        EngineEventKind::Progress => {
            trace!(task = e.as_task(), percent = e.percent(), message = e.as_reason(), "{msg}")
        }

        // engine
        EngineEventKind::ConfigUpdated => info!(detail = e.as_reason(), "{msg}"),
        EngineEventKind::Shutdown => info!("{msg}"),
    }
}

/// Subscriber that mirrors every engine event into the tracing pipeline.
pub struct EventLog;

impl EventLog {
    pub fn new() -> Self {
        Self
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Subscribe for EventLog {
    async fn on_event(&self, event: &EngineEvent) {
        log_event(event);
    }

    fn name(&self) -> &'static str {
        "event-log"
    }
}
