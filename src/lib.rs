//! Pilot - intent-driven browser automation
//!
//! Turns a natural-language intent into a verified, replayable step document
//! by generating steps with a local LLM, running them against a real browser
//! and feeding the outcome back until the run satisfies the intent.
//!
//! # Architecture
//!
//! - **Core**: Shared types, configuration, and error handling
//! - **Steps**: Step document parsing and `${NAME}` substitution
//! - **Actions**: Action registry and the built-in handlers
//! - **Executor**: Sequential step execution with a failure policy
//! - **Digest**: Compact page summaries, cached per URL
//! - **Selector**: Ranking alternative selectors after an empty extraction
//! - **Agent**: The generate, execute and verify feedback loop
//! - **Storage**: Run log and saved workflows
//! - **LLM**: Provider abstraction with Ollama implementation
//! - **Browser**: Browser capability trait with an agent-browser backend
//! - **CLI**: Subcommands and the interactive prompt
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use pilot::actions::ActionRegistry;
//! use pilot::browser::AgentBrowser;
//! use pilot::executor::{ActionExecutor, ExecutionContext};
//! use pilot::steps::StepParser;
//!
//! #[tokio::main]
//! async fn main() -> pilot::Result<()> {
//!     let registry = Arc::new(ActionRegistry::with_defaults());
//!     let parsed = StepParser::new(&registry).parse_str("- navigate: https://example.com\n")?;
//!
//!     let executor = ActionExecutor::new(registry, Arc::new(AgentBrowser::default()));
//!     let result = executor.execute(&parsed.actions, &mut ExecutionContext::new()).await?;
//!     println!("{}", result.summary());
//!     Ok(())
//! }
//! ```

pub mod actions;
pub mod agent;
pub mod browser;
pub mod cli;
pub mod core;
pub mod digest;
pub mod executor;
pub mod llm;
pub mod selector;
pub mod steps;
pub mod storage;

// Re-export commonly used items
pub use agent::FeedbackLoop;
pub use core::{Config, PilotError, Result};
pub use executor::ActionExecutor;
