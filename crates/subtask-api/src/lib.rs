//! In-process API facade over the subtask engine.
//!
//! The [`ApiHandler`] trait abstracts the backend so hosts can wrap the
//! provided [`EngineAdapter`] with additional logic (auth, rate limiting,
//! request shaping). The `http` feature mounts the handler behind an axum
//! router.

mod error;
pub use error::ApiError;

mod handler;
pub use handler::{ApiHandler, SubmitTask};

mod adapter;
pub use adapter::EngineAdapter;

#[cfg(feature = "http")]
mod http;
#[cfg(feature = "http")]
pub use http::HttpApi;
