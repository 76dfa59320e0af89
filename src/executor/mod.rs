//! Executor module - runs parsed actions against the live page

pub mod context;
pub mod runner;

pub use context::ExecutionContext;
pub use runner::{summarize_output, ActionExecutor, FailurePolicy};
