//! Custom error types for Pilot
//!
//! Provides a unified error handling system across all modules.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::types::WorkflowExecutionResult;

/// Main error type for Pilot operations
#[derive(Error, Debug)]
pub enum PilotError {
    /// Malformed step document, fatal before execution
    #[error("Parse error: {message}")]
    Parse {
        message: String,
        /// Offending raw content
        content: String,
    },

    /// Step names a kind that has no registered handler
    #[error("Unknown command '{kind}' at step {step}")]
    UnknownCommand { kind: String, step: usize },

    /// A step failed under the strict policy
    #[error("{failure}")]
    ActionFailure {
        failure: StepFailure,
        /// Results recorded up to and including the failing step
        partial: Box<WorkflowExecutionResult>,
    },

    /// The generation oracle errored or produced an unusable document
    #[error("Generation failed: {message}")]
    Generation {
        message: String,
        /// Raw oracle output, empty when the oracle never answered
        raw: String,
    },

    /// The verification oracle errored or answered without a verdict
    #[error("Verification failed: {0}")]
    Verification(String),

    /// Browser automation errors
    #[error("Browser error: {0}")]
    Browser(String),

    /// Ollama connection or API errors
    #[error("Ollama error: {0}")]
    Ollama(String),

    /// Ollama not reachable
    #[error("Cannot reach Ollama at {0}. Start it with `ollama serve` and pull '{1}'.")]
    OllamaNotReachable(String, String),

    /// Model not available
    #[error("Model '{0}' not available in Ollama. Run: ollama pull {0}")]
    ModelNotFound(String),

    /// agent-browser not installed
    #[error("agent-browser not found. Install with: npm install -g agent-browser && agent-browser install")]
    AgentBrowserNotFound,

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Run log or workflow store errors
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// JSON parsing errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error for other cases
    #[error("{0}")]
    Other(String),
}

/// Convenience Result type for Pilot operations
pub type Result<T> = std::result::Result<T, PilotError>;

impl PilotError {
    /// Create a parse error carrying the offending content
    pub fn parse(message: impl Into<String>, content: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
            content: content.into(),
        }
    }

    /// Create a generation error carrying the raw oracle output
    pub fn generation(message: impl Into<String>, raw: impl Into<String>) -> Self {
        Self::Generation {
            message: message.into(),
            raw: raw.into(),
        }
    }

    /// Create a browser error
    pub fn browser(msg: impl Into<String>) -> Self {
        Self::Browser(msg.into())
    }

    /// Create an Ollama error
    pub fn ollama(msg: impl Into<String>) -> Self {
        Self::Ollama(msg.into())
    }

    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a persistence error
    pub fn persistence(msg: impl Into<String>) -> Self {
        Self::Persistence(msg.into())
    }

    /// The failing step, for errors in the action failure family
    pub fn failed_step(&self) -> Option<usize> {
        match self {
            Self::ActionFailure { failure, .. } => Some(failure.step()),
            Self::UnknownCommand { step, .. } => Some(*step),
            _ => None,
        }
    }
}

/// Why a single step did not succeed.
///
/// Timeouts always carry the attempted selector or condition and the budget
/// that expired.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepFailure {
    Action {
        step: usize,
        kind: String,
        target: Option<String>,
        message: String,
    },
    Timeout {
        step: usize,
        kind: String,
        target: Option<String>,
        timeout_ms: u64,
    },
}

impl StepFailure {
    pub fn step(&self) -> usize {
        match self {
            Self::Action { step, .. } | Self::Timeout { step, .. } => *step,
        }
    }

    pub fn kind(&self) -> &str {
        match self {
            Self::Action { kind, .. } | Self::Timeout { kind, .. } => kind,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

impl fmt::Display for StepFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Action {
                step,
                kind,
                target,
                message,
            } => match target {
                Some(target) => write!(f, "step {step} ({kind}) failed on '{target}': {message}"),
                None => write!(f, "step {step} ({kind}) failed: {message}"),
            },
            Self::Timeout {
                step,
                kind,
                target,
                timeout_ms,
            } => match target {
                Some(target) => write!(
                    f,
                    "step {step} ({kind}) timed out after {timeout_ms}ms on '{target}'"
                ),
                None => write!(f, "step {step} ({kind}) timed out after {timeout_ms}ms"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_display_names_step_and_target() {
        let failure = StepFailure::Action {
            step: 2,
            kind: "click".into(),
            target: Some("#missing".into()),
            message: "no element matches".into(),
        };
        let text = failure.to_string();
        assert!(text.contains("step 2"));
        assert!(text.contains("#missing"));
        assert!(text.contains("click"));
    }

    #[test]
    fn test_timeout_display() {
        let failure = StepFailure::Timeout {
            step: 4,
            kind: "wait".into(),
            target: Some(".results".into()),
            timeout_ms: 1500,
        };
        assert!(failure.is_timeout());
        assert_eq!(
            failure.to_string(),
            "step 4 (wait) timed out after 1500ms on '.results'"
        );
    }

    #[test]
    fn test_unknown_command_step() {
        let err = PilotError::UnknownCommand {
            kind: "teleport".into(),
            step: 3,
        };
        assert_eq!(err.failed_step(), Some(3));
        assert!(err.to_string().contains("teleport"));
    }
}
