//! Storage module - run log and saved workflows

pub mod runlog;
pub mod workflow;

pub use runlog::{RunContext, RunLog, RunLogEntry};
pub use workflow::{FileWorkflowStore, SavedWorkflow, WorkflowStore};
