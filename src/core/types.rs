//! Shared types used across Pilot modules
//!
//! Contains per-step and per-run execution results and the verification verdict.

use serde::{Deserialize, Serialize};

/// Result of executing one step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    /// 1-based position in the executed document
    pub step_number: usize,
    /// Action kind that ran
    pub kind: String,
    /// Whether the step succeeded
    pub success: bool,
    /// Wall-clock duration of the dispatch
    pub duration_ms: u64,
    /// Truncated textual summary of the return value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    /// Failure description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Raw value returned by the step
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ExecutionResult {
    /// Create a successful step result
    pub fn success(
        step_number: usize,
        kind: impl Into<String>,
        duration_ms: u64,
        output: Option<String>,
        data: Option<serde_json::Value>,
    ) -> Self {
        Self {
            step_number,
            kind: kind.into(),
            success: true,
            duration_ms,
            output,
            error: None,
            data,
        }
    }

    /// Create a failed step result
    pub fn failure(
        step_number: usize,
        kind: impl Into<String>,
        duration_ms: u64,
        error: impl Into<String>,
    ) -> Self {
        Self {
            step_number,
            kind: kind.into(),
            success: false,
            duration_ms,
            output: None,
            error: Some(error.into()),
            data: None,
        }
    }
}

/// Aggregate result of executing a document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowExecutionResult {
    pub total_steps: usize,
    pub successful_steps: usize,
    pub failed_steps: usize,
    pub total_duration_ms: u64,
    pub steps: Vec<ExecutionResult>,
}

impl WorkflowExecutionResult {
    /// Build the aggregate from step results; the tallies are always derived
    /// from `steps`, so `total_steps = successful_steps + failed_steps`.
    pub fn from_steps(steps: Vec<ExecutionResult>, total_duration_ms: u64) -> Self {
        let successful_steps = steps.iter().filter(|s| s.success).count();
        Self {
            total_steps: steps.len(),
            successful_steps,
            failed_steps: steps.len() - successful_steps,
            total_duration_ms,
            steps,
        }
    }

    /// Whether every step succeeded
    pub fn all_succeeded(&self) -> bool {
        self.failed_steps == 0
    }

    /// First failed step, if any
    pub fn first_failure(&self) -> Option<&ExecutionResult> {
        self.steps.iter().find(|s| !s.success)
    }

    /// One line per step, used in prompts and CLI output
    pub fn summary(&self) -> String {
        let mut out = format!(
            "{} steps: {} succeeded, {} failed ({}ms)",
            self.total_steps, self.successful_steps, self.failed_steps, self.total_duration_ms
        );
        for step in &self.steps {
            let status = if step.success { "ok" } else { "FAILED" };
            out.push_str(&format!("\n  [{}] {} {}", step.step_number, step.kind, status));
            if let Some(ref output) = step.output {
                out.push_str(&format!(" -> {}", output));
            }
            if let Some(ref error) = step.error {
                out.push_str(&format!(" -> {}", error));
            }
        }
        out
    }
}

/// Verdict returned by the verification oracle
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VerificationResult {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub analysis: String,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub suggestions: Vec<String>,
}

impl VerificationResult {
    /// Verdict used when the oracle could not be consulted
    pub fn assumed_success(reason: impl Into<String>) -> Self {
        Self {
            success: true,
            analysis: "Verification unavailable; result assumed successful.".to_string(),
            reason: reason.into(),
            suggestions: Vec::new(),
        }
    }

    /// Verdict used when the oracle could not be consulted and the user decides
    pub fn unverified(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            analysis: "Verification unavailable; outcome unknown.".to_string(),
            reason: reason.into(),
            suggestions: Vec::new(),
        }
    }
}
