//! Feedback loop state
//!
//! Tracks where a session is in the GENERATE → EXECUTE → VERIFY cycle and
//! keeps the append-only attempt history later rounds are generated from.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::core::{VerificationResult, WorkflowExecutionResult};
use crate::digest::DomDigest;
use crate::selector::SelectorCandidate;

/// States of the feedback loop.
///
/// Each round flows GENERATE → EXECUTE → VERIFY and then to ACCEPT, RETRY or
/// ABANDON. ACCEPT may lead back to GENERATE when the workflow is extended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoopState {
    Generate,
    Execute,
    Verify,
    Accept,
    Retry,
    Abandon,
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoopState::Generate => write!(f, "GENERATE"),
            LoopState::Execute => write!(f, "EXECUTE"),
            LoopState::Verify => write!(f, "VERIFY"),
            LoopState::Accept => write!(f, "ACCEPT"),
            LoopState::Retry => write!(f, "RETRY"),
            LoopState::Abandon => write!(f, "ABANDON"),
        }
    }
}

impl LoopState {
    pub fn can_transition_to(self, next: LoopState) -> bool {
        use LoopState::*;
        matches!(
            (self, next),
            (Generate, Execute)
                | (Generate, Abandon)
                | (Execute, Verify)
                | (Verify, Accept)
                | (Verify, Retry)
                | (Verify, Abandon)
                | (Retry, Generate)
                | (Retry, Abandon)
                | (Accept, Generate)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, LoopState::Abandon)
    }
}

/// Current state plus every state visited, in order
#[derive(Debug, Clone)]
pub struct LoopTracker {
    state: LoopState,
    history: Vec<LoopState>,
}

impl LoopTracker {
    pub fn new() -> Self {
        Self {
            state: LoopState::Generate,
            history: vec![LoopState::Generate],
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn history(&self) -> &[LoopState] {
        &self.history
    }

    /// Move to `next`. Returns false and stays put on an illegal transition.
    pub fn transition(&mut self, next: LoopState) -> bool {
        if !self.state.can_transition_to(next) {
            return false;
        }
        info!("{} -> {}", self.state, next);
        self.state = next;
        self.history.push(next);
        true
    }
}

impl Default for LoopTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// How VERIFY judged a round
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Verified,
    Rejected,
    /// An extraction step returned nothing
    EmptyExtraction,
    /// The verifier gave no usable answer
    Unknown,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Verified => write!(f, "VERIFIED"),
            Verdict::Rejected => write!(f, "REJECTED"),
            Verdict::EmptyExtraction => write!(f, "FAILED-EMPTY-EXTRACTION"),
            Verdict::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// What was learned about the page after an empty extraction
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostics {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<DomDigest>,
    #[serde(default)]
    pub candidates: Vec<SelectorCandidate>,
}

/// One generate-execute-verify round
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attempt {
    pub round: usize,
    pub intent_text: String,
    pub generated_document: String,
    /// Round only emitted steps on top of an accepted workflow
    #[serde(default)]
    pub extends: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_result: Option<WorkflowExecutionResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verdict: Option<Verdict>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification: Option<VerificationResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<Diagnostics>,
}

impl Attempt {
    pub fn new(round: usize, intent_text: impl Into<String>, generated_document: impl Into<String>) -> Self {
        Self {
            round,
            intent_text: intent_text.into(),
            generated_document: generated_document.into(),
            extends: false,
            execution_result: None,
            verdict: None,
            verification: None,
            diagnostics: None,
        }
    }

    /// Suggestions from the verifier, if it rejected the round
    pub fn suggestions(&self) -> &[String] {
        self.verification
            .as_ref()
            .map(|v| v.suggestions.as_slice())
            .unwrap_or(&[])
    }
}

/// Append-only history of attempts for one session.
///
/// Extending an accepted workflow starts a new segment; only the current
/// segment is shown to the generator.
#[derive(Debug, Clone, Default)]
pub struct AttemptHistory {
    attempts: Vec<Attempt>,
    segment_start: usize,
}

impl AttemptHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, attempt: Attempt) {
        self.attempts.push(attempt);
    }

    pub fn len(&self) -> usize {
        self.attempts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attempts.is_empty()
    }

    pub fn last(&self) -> Option<&Attempt> {
        self.attempts.last()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Attempt> {
        self.attempts.iter()
    }

    pub fn into_vec(self) -> Vec<Attempt> {
        self.attempts
    }

    pub fn start_segment(&mut self) {
        self.segment_start = self.attempts.len();
    }

    /// Attempts since the last accepted workflow
    pub fn current_segment(&self) -> &[Attempt] {
        &self.attempts[self.segment_start..]
    }

    /// Format the current segment for inclusion in the next generation prompt
    pub fn format_for_prompt(&self) -> String {
        let segment = self.current_segment();
        if segment.is_empty() {
            return String::new();
        }

        let mut output = String::from("\n\n## Previous attempts\n");
        for attempt in segment {
            output.push_str(&format!(
                "\n### Attempt {} ({})\nIntent: {}\nSteps:\n{}\n",
                attempt.round,
                attempt
                    .verdict
                    .map(|v| v.to_string())
                    .unwrap_or_else(|| "not verified".to_string()),
                attempt.intent_text,
                attempt.generated_document.trim_end()
            ));

            if let Some(ref result) = attempt.execution_result {
                output.push_str(&format!("Execution: {}\n", result.summary()));
            }

            if let Some(ref verification) = attempt.verification {
                if !verification.reason.is_empty() {
                    output.push_str(&format!("Verifier: {}\n", verification.reason));
                }
            }

            if let Some(ref diagnostics) = attempt.diagnostics {
                output.push_str("The extraction returned nothing. Page structure:\n");
                if let Some(ref digest) = diagnostics.digest {
                    output.push_str(&digest.to_json());
                    output.push('\n');
                }
                if !diagnostics.candidates.is_empty() {
                    output.push_str("Selector candidates (best first, count = matches):\n");
                    for candidate in &diagnostics.candidates {
                        output.push_str(&format!(
                            "- {} count={} score={:.2}\n",
                            candidate.selector, candidate.element_count, candidate.confidence_score
                        ));
                    }
                }
            }
        }
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selector::Specificity;

    #[test]
    fn test_state_display() {
        assert_eq!(LoopState::Generate.to_string(), "GENERATE");
        assert_eq!(Verdict::EmptyExtraction.to_string(), "FAILED-EMPTY-EXTRACTION");
    }

    #[test]
    fn test_legal_round_transitions() {
        let mut tracker = LoopTracker::new();
        assert!(tracker.transition(LoopState::Execute));
        assert!(tracker.transition(LoopState::Verify));
        assert!(tracker.transition(LoopState::Retry));
        assert!(tracker.transition(LoopState::Generate));
        assert_eq!(tracker.history().len(), 5);
    }

    #[test]
    fn test_illegal_transition_rejected() {
        let mut tracker = LoopTracker::new();
        assert!(!tracker.transition(LoopState::Accept));
        assert_eq!(tracker.state(), LoopState::Generate);
        assert!(LoopState::Abandon.is_terminal());
        assert!(!LoopState::Abandon.can_transition_to(LoopState::Generate));
    }

    #[test]
    fn test_history_starts_empty_and_formats_nothing() {
        let history = AttemptHistory::new();
        assert!(history.is_empty());
        assert_eq!(history.format_for_prompt(), "");
    }

    #[test]
    fn test_history_includes_diagnostics() {
        let mut attempt = Attempt::new(1, "extract all titles", "- evaluate: \"[]\"\n");
        attempt.verdict = Some(Verdict::EmptyExtraction);
        attempt.diagnostics = Some(Diagnostics {
            digest: None,
            candidates: vec![SelectorCandidate {
                selector: "h2.title".into(),
                element_count: 12,
                confidence_score: 0.9,
                specificity: Specificity::Class,
            }],
        });

        let mut history = AttemptHistory::new();
        history.push(attempt);
        let text = history.format_for_prompt();
        assert!(text.contains("Attempt 1 (FAILED-EMPTY-EXTRACTION)"));
        assert!(text.contains("h2.title count=12"));
    }

    #[test]
    fn test_new_segment_hides_earlier_attempts() {
        let mut history = AttemptHistory::new();
        history.push(Attempt::new(1, "open x", "- navigate: https://x.test"));
        history.start_segment();
        assert_eq!(history.len(), 1);
        assert!(history.current_segment().is_empty());
        assert_eq!(history.format_for_prompt(), "");
    }
}
