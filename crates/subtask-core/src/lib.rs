pub mod error;
pub use error::EngineError;
pub mod event;
pub use event::{EngineEvent, EngineEventKind, ProgressSink, Subscribe};
pub mod executor;
pub use executor::{ExecOptions, ExecOutcome, SubAgentExecutor};
pub mod registry;
pub use registry::ExecutorRegistry;
pub mod engine;
pub use engine::{SubAgentEngine, SubAgentEngineBuilder, Submission};

mod state;
mod stats;
