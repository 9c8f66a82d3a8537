mod config;
mod error;
mod format;
mod init;

pub use config::LogConfig;
pub use error::LoggerError;
pub use format::LogFormat;

/// Install the process-wide tracing subscriber.
///
/// Fails if a global subscriber was already set.
pub fn init_logging(cfg: &LogConfig) -> Result<(), LoggerError> {
    match cfg.format {
        LogFormat::Text => init::text(cfg),
        LogFormat::Json => init::json(cfg),
        LogFormat::Journald => init::journald(cfg),
    }
}
