//! Normalized actions produced by the step parser

use serde::{Deserialize, Serialize};

/// One executable unit derived from a step entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    /// Registered action kind, e.g. `navigate`
    pub kind: String,
    /// Canonical argument object for the kind
    pub arguments: serde_json::Value,
    /// 1-based position in the source document
    pub step_index: usize,
    /// Per-step dispatch timeout lifted out of structured arguments
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl Action {
    pub fn new(kind: impl Into<String>, arguments: serde_json::Value, step_index: usize) -> Self {
        Self {
            kind: kind.into(),
            arguments,
            step_index,
            timeout_ms: None,
        }
    }

    /// String argument by key
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.arguments.get(key).and_then(|v| v.as_str())
    }
}

/// Output of parsing a step document
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedDocument {
    pub actions: Vec<Action>,
    /// Non-fatal issues, e.g. ignored extra keys
    pub warnings: Vec<String>,
}

impl ParsedDocument {
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}
