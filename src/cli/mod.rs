//! CLI module - command-line interface
//!
//! Subcommand handlers and the interactive decision prompt.

pub mod commands;
pub mod interactive;

pub use commands::{parse_vars, run_document, run_loop, show_runs, show_workflows, DocumentSource};
pub use interactive::StdinDecider;
