//! Actions module - step kinds and their handlers

pub mod handlers;
pub mod registry;

pub use registry::{ActionHandler, ActionRegistry, StepCall};
