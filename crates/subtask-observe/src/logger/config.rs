use std::io::IsTerminal;

use serde::Deserialize;

use crate::logger::format::LogFormat;

#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LogConfig {
    pub format: LogFormat,
    /// env-filter syntax, e.g. `"info"` or `"subtask_core=debug,info"`.
    pub level: String,
    pub with_targets: bool,
    pub use_color: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Text,
            level: "info".to_string(),
            with_targets: true,
            use_color: std::io::stdout().is_terminal(),
        }
    }
}
