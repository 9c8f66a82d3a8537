use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExecError {
    #[error("spawn failed: {0}")]
    Spawn(String),
    #[error("non-zero exit code: {code}")]
    NonZeroExit { code: i32 },
    #[error("terminated by signal")]
    KilledBySignal,
    #[error("missing program")]
    MissingProgram,
    #[error("io error: {0}")]
    Io(String),
    #[error("cancelled")]
    Cancelled,
    #[error("no handler registered for task type '{0}'")]
    HandlerNotFound(String),
}

impl From<std::io::Error> for ExecError {
    fn from(e: std::io::Error) -> Self {
        ExecError::Io(e.to_string())
    }
}
