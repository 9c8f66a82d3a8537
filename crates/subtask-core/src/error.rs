use subtask_model::TaskId;
use thiserror::Error;

/// Errors surfaced to callers of the engine.
///
/// These are call-site conditions only. Failures intrinsic to a task's
/// execution (failure, timeout, cancellation) are never thrown; they are
/// delivered as a terminal `TaskResult`.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("admission rejected: {0}")]
    AdmissionRejected(String),

    #[error("executor '{0}' does not support sub-agent tasks")]
    ExecutorUnsupported(String),

    #[error("task not found: {0}")]
    NotFound(TaskId),

    #[error("engine is shut down")]
    ShuttingDown,
}
