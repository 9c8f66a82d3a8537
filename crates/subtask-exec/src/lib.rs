//! Executor implementations for the subtask engine.
//!
//! The engine only knows the `SubAgentExecutor` capability interface; this
//! crate provides the concrete backends: an in-process handler registry
//! ([`BuiltinExecutor`]), a child-process backend ([`process::ProcessExecutor`])
//! for driving an external agent CLI, and a [`NullExecutor`] placeholder that
//! advertises no sub-agent support.

mod error;
pub use error::ExecError;

pub mod builtin;
pub use builtin::BuiltinExecutor;

mod null;
pub use null::NullExecutor;

#[cfg(feature = "process")]
pub mod process;
#[cfg(feature = "process")]
pub use process::{ProcessConfig, ProcessExecutor};

#[cfg(feature = "process")]
pub(crate) mod util;

pub mod prelude {
    pub use crate::BuiltinExecutor;
    pub use crate::NullExecutor;
    pub use crate::error::ExecError;
    #[cfg(feature = "process")]
    pub use crate::process::{ProcessConfig, ProcessExecutor};
}
