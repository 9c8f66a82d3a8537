//! Domain types for the subtask orchestration SDK.
//!
//! This crate is dependency-light on purpose: it holds the serializable
//! records exchanged between the engine, executors, subscribers and API
//! surfaces, and nothing else.

mod domain;
pub use domain::*;
