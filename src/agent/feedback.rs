//! Feedback loop controller
//!
//! Drives GENERATE → EXECUTE → VERIFY rounds until the user accepts a
//! workflow, abandons it, or the attempt cap is reached:
//!
//! 1. GENERATE asks the generator oracle for a step document, given the
//!    intent and every earlier attempt of the current segment
//! 2. EXECUTE runs it with continue-on-error so one bad step still leaves
//!    signal for the next round
//! 3. VERIFY flags an empty extraction itself when the last data-returning
//!    extraction step came back as `[]` or `0 items` (collecting a digest and
//!    ranked selectors for the next round) and otherwise asks the verifier
//!
//! After ACCEPT the caller may extend the workflow: the next round only
//! generates new steps and runs them on the live page with the accepted
//! round's context, without replaying anything.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use serde_yaml::Value as YamlValue;
use tracing::{info, warn};

use crate::actions::ActionRegistry;
use crate::agent::classifier::{IntentClassifier, KeywordClassifier};
use crate::agent::loop_state::{Attempt, AttemptHistory, Diagnostics, LoopState, LoopTracker, Verdict};
use crate::agent::prompts::{generation_prompt, verification_prompt, ExtendContext};
use crate::agent::response::{extract_document, is_empty_value, parse_verification};
use crate::browser::BrowserCapability;
use crate::core::config::{FeedbackConfig, VerificationFallback};
use crate::core::{Config, PilotError, Result, VerificationResult, WorkflowExecutionResult};
use crate::digest::DigestCollector;
use crate::executor::{ActionExecutor, ExecutionContext, FailurePolicy};
use crate::llm::Oracle;
use crate::selector::{Cardinality, RankRequest, SelectorRanker};
use crate::steps::{Action, StepParser};
use crate::storage::{RunContext, RunLog};

static SCRIPT_SELECTOR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"querySelector(?:All)?\(\s*['"`]([^'"`]+)['"`]\s*\)"#)
        .expect("script selector pattern is valid")
});

/// What to do after a round that was not accepted
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryChoice {
    /// Apply one of the verifier's suggestions, by index
    Suggestion(usize),
    /// Free-form guidance appended to the intent
    Feedback(String),
    /// Try again with the same intent
    Retry,
    Abandon,
}

/// What to do after an accepted round
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcceptChoice {
    Finish,
    /// Continue from the current page with a follow-up intent
    Extend(String),
}

/// Source of the user's decisions between rounds
#[async_trait]
pub trait FeedbackDecider: Send + Sync {
    async fn after_failure(&self, attempt: &Attempt) -> RetryChoice;

    /// `document` is the full accepted workflow so far
    async fn after_success(&self, attempt: &Attempt, document: &str) -> AcceptChoice;

    /// Whether to accept a round the verifier could not judge
    async fn confirm_unverified(&self, _attempt: &Attempt) -> bool {
        true
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbandonReason {
    UserRequested,
    AttemptCap { attempts: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoopOutcome {
    Accepted {
        /// Every accepted segment, merged into one document
        document: String,
        verification: VerificationResult,
    },
    Abandoned(AbandonReason),
}

#[derive(Debug, Clone)]
pub struct LoopReport {
    pub outcome: LoopOutcome,
    pub attempts: Vec<Attempt>,
    /// Run log entries written, in round order
    pub run_ids: Vec<String>,
    /// Context of the last accepted round
    pub context: Option<ExecutionContext>,
    pub states: Vec<LoopState>,
}

impl LoopReport {
    pub fn is_accepted(&self) -> bool {
        matches!(self.outcome, LoopOutcome::Accepted { .. })
    }

    pub fn document(&self) -> Option<&str> {
        match self.outcome {
            LoopOutcome::Accepted { ref document, .. } => Some(document),
            LoopOutcome::Abandoned(_) => None,
        }
    }

    pub fn rounds(&self) -> usize {
        self.attempts.len()
    }
}

pub struct FeedbackLoop {
    generator: Arc<dyn Oracle>,
    verifier: Arc<dyn Oracle>,
    page: Arc<dyn BrowserCapability>,
    registry: Arc<ActionRegistry>,
    collector: Arc<DigestCollector>,
    ranker: SelectorRanker,
    classifier: Arc<dyn IntentClassifier>,
    run_log: Option<RunLog>,
    feedback: FeedbackConfig,
    action_timeout: Duration,
    output_limit: usize,
    variables: HashMap<String, String>,
}

/// Session state carried across rounds
struct Session {
    tracker: LoopTracker,
    history: AttemptHistory,
    run_ids: Vec<String>,
    accepted_documents: Vec<String>,
    accepted_context: Option<ExecutionContext>,
}

impl Session {
    fn finish(self, outcome: LoopOutcome) -> LoopReport {
        LoopReport {
            outcome,
            states: self.tracker.history().to_vec(),
            attempts: self.history.into_vec(),
            run_ids: self.run_ids,
            context: self.accepted_context,
        }
    }
}

fn refine(intent: &str, guidance: &str) -> String {
    format!("{}\n\nAdditional guidance: {}", intent.trim_end(), guidance.trim())
}

/// Concatenate step documents into one
pub fn merge_documents(documents: &[String]) -> Result<String> {
    if let [only] = documents {
        return Ok(only.clone());
    }
    let mut steps = Vec::new();
    for document in documents {
        if let YamlValue::Sequence(items) = serde_yaml::from_str::<YamlValue>(document)? {
            steps.extend(items);
        }
    }
    Ok(serde_yaml::to_string(&YamlValue::Sequence(steps))?)
}

/// Data returned by the last extraction step that produced any.
///
/// Steps that returned null (side-effect scripts) and `store` steps holding a
/// literal `value` are skipped.
pub fn extracted_value<'a>(
    registry: &ActionRegistry,
    actions: &[Action],
    result: &'a WorkflowExecutionResult,
) -> Option<&'a Value> {
    actions
        .iter()
        .zip(&result.steps)
        .filter(|(_, step)| step.success && registry.is_extraction(&step.kind))
        .filter(|(action, _)| action.arguments.get("value").is_none())
        .filter_map(|(_, step)| step.data.as_ref())
        .filter(|data| !data.is_null())
        .last()
}

/// Selectors a round tried, from arguments and from scripts
pub fn seed_selectors(actions: &[Action]) -> Vec<String> {
    let mut seeds: Vec<String> = Vec::new();
    for action in actions {
        if let Some(selector) = action.get_str("selector") {
            seeds.push(selector.to_string());
        }
        if let Some(script) = action.get_str("script") {
            seeds.extend(
                SCRIPT_SELECTOR
                    .captures_iter(script)
                    .map(|caps| caps[1].to_string()),
            );
        }
    }
    let mut seen = std::collections::HashSet::new();
    seeds.retain(|s| seen.insert(s.clone()));
    seeds
}

impl FeedbackLoop {
    pub fn new(
        generator: Arc<dyn Oracle>,
        verifier: Arc<dyn Oracle>,
        page: Arc<dyn BrowserCapability>,
        config: &Config,
    ) -> Self {
        Self {
            generator,
            verifier,
            collector: Arc::new(DigestCollector::new(page.clone(), config.digest.clone())),
            ranker: SelectorRanker::new(page.clone(), config.ranker.clone()),
            page,
            registry: Arc::new(ActionRegistry::with_defaults()),
            classifier: Arc::new(KeywordClassifier),
            run_log: None,
            feedback: config.feedback.clone(),
            action_timeout: config.action_timeout(),
            output_limit: config.executor.output_limit,
            variables: HashMap::new(),
        }
    }

    pub fn with_registry(mut self, registry: Arc<ActionRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_classifier(mut self, classifier: impl IntentClassifier + 'static) -> Self {
        self.classifier = Arc::new(classifier);
        self
    }

    pub fn with_run_log(mut self, run_log: RunLog) -> Self {
        self.run_log = Some(run_log);
        self
    }

    /// Initial variables for `${NAME}` substitution
    pub fn with_variables(mut self, variables: HashMap<String, String>) -> Self {
        self.variables = variables;
        self
    }

    pub fn collector(&self) -> &DigestCollector {
        &self.collector
    }

    /// Run the loop for `intent` until it is accepted or abandoned.
    ///
    /// Generation failures (oracle error, timeout, unusable document) end the
    /// session with [`PilotError::Generation`].
    pub async fn run(&self, intent: &str, decider: &dyn FeedbackDecider) -> Result<LoopReport> {
        let mut session = Session {
            tracker: LoopTracker::new(),
            history: AttemptHistory::new(),
            run_ids: Vec::new(),
            accepted_documents: Vec::new(),
            accepted_context: None,
        };

        let mut intent = intent.trim().to_string();
        let mut segment_attempts = 0usize;
        let mut round = 0usize;

        loop {
            if segment_attempts >= self.feedback.max_attempts {
                return Ok(self.abandon_at_cap(session, segment_attempts));
            }
            segment_attempts += 1;
            round += 1;
            let extending = !session.accepted_documents.is_empty();
            info!(
                round,
                attempt = segment_attempts,
                max_attempts = self.feedback.max_attempts,
                extending,
                "round started"
            );

            // GENERATE
            let (document, actions) = self.generate(&intent, &session).await?;
            let mut attempt = Attempt::new(round, &intent, &document);
            attempt.extends = extending;

            // EXECUTE
            session.tracker.transition(LoopState::Execute);
            let mut ctx = session
                .accepted_context
                .clone()
                .unwrap_or_else(|| ExecutionContext::with_variables(self.variables.clone()));
            let executor = ActionExecutor::new(self.registry.clone(), self.page.clone())
                .with_policy(FailurePolicy::ContinueOnError)
                .with_timeout(self.action_timeout)
                .with_output_limit(self.output_limit);
            let result = executor.execute(&actions, &mut ctx).await?;

            // VERIFY
            session.tracker.transition(LoopState::Verify);
            let class = self.classifier.classify(&intent);
            let came_back_empty = class.extraction
                && extracted_value(&self.registry, &actions, &result).is_some_and(is_empty_value);
            let (verdict, verification) = if came_back_empty {
                (Verdict::EmptyExtraction, None)
            } else {
                self.verify(&intent, &document, &result).await
            };
            info!(round, %verdict, "round verified");

            if verdict == Verdict::EmptyExtraction {
                attempt.diagnostics = Some(self.diagnose(&intent, class.cardinality, &actions).await);
            }

            if let Some(id) = self.log_round(&result, &attempt, &intent, round).await {
                session.run_ids.push(id);
            }

            attempt.execution_result = Some(result);
            attempt.verdict = Some(verdict);
            attempt.verification = verification;

            let accepted = match verdict {
                Verdict::Verified => true,
                Verdict::Unknown => decider.confirm_unverified(&attempt).await,
                Verdict::Rejected | Verdict::EmptyExtraction => false,
            };

            if accepted {
                session.tracker.transition(LoopState::Accept);
                session.accepted_documents.push(document);
                session.accepted_context = Some(ctx);
                let merged = merge_documents(&session.accepted_documents)?;
                let verification = attempt.verification.clone().unwrap_or_default();

                let choice = decider.after_success(&attempt, &merged).await;
                session.history.push(attempt);

                match choice {
                    AcceptChoice::Finish => {
                        info!(rounds = round, "workflow accepted");
                        return Ok(session.finish(LoopOutcome::Accepted {
                            document: merged,
                            verification,
                        }));
                    }
                    AcceptChoice::Extend(follow_up) => {
                        info!("extending accepted workflow");
                        session.tracker.transition(LoopState::Generate);
                        session.history.start_segment();
                        intent = follow_up.trim().to_string();
                        segment_attempts = 0;
                        continue;
                    }
                }
            }

            session.tracker.transition(LoopState::Retry);

            if segment_attempts >= self.feedback.max_attempts {
                session.history.push(attempt);
                return Ok(self.abandon_at_cap(session, segment_attempts));
            }

            let choice = if verdict == Verdict::EmptyExtraction {
                info!("extraction came back empty, retrying with page digest");
                RetryChoice::Retry
            } else {
                decider.after_failure(&attempt).await
            };

            match choice {
                RetryChoice::Suggestion(index) => match attempt.suggestions().get(index) {
                    Some(suggestion) => intent = refine(&intent, suggestion),
                    None => warn!(index, "no such suggestion, retrying unchanged"),
                },
                RetryChoice::Feedback(text) => intent = refine(&intent, &text),
                RetryChoice::Retry => {}
                RetryChoice::Abandon => {
                    session.history.push(attempt);
                    session.tracker.transition(LoopState::Abandon);
                    info!(rounds = round, "abandoned by user");
                    return Ok(session.finish(LoopOutcome::Abandoned(AbandonReason::UserRequested)));
                }
            }

            session.history.push(attempt);
            session.tracker.transition(LoopState::Generate);
        }
    }

    fn abandon_at_cap(&self, mut session: Session, attempts: usize) -> LoopReport {
        session.tracker.transition(LoopState::Abandon);
        warn!(attempts, "attempt cap reached, abandoning");
        session.finish(LoopOutcome::Abandoned(AbandonReason::AttemptCap { attempts }))
    }

    /// Bound an oracle call by the configured timeout
    async fn ask(&self, oracle: &dyn Oracle, prompt: &str) -> Result<String> {
        let timeout = Duration::from_secs(self.feedback.oracle_timeout_secs);
        match tokio::time::timeout(timeout, oracle.generate(prompt)).await {
            Ok(answer) => answer,
            Err(_) => Err(PilotError::Other(format!(
                "oracle timed out after {}s",
                timeout.as_secs()
            ))),
        }
    }

    async fn generate(&self, intent: &str, session: &Session) -> Result<(String, Vec<Action>)> {
        let merged;
        let current_url;
        let extend = if session.accepted_documents.is_empty() {
            None
        } else {
            merged = merge_documents(&session.accepted_documents)?;
            current_url = self.page.current_url().await.unwrap_or_default();
            Some(ExtendContext {
                accepted_document: &merged,
                current_url: &current_url,
            })
        };

        let prompt = generation_prompt(intent, &self.registry, &session.history, extend.as_ref());
        let raw = self
            .ask(self.generator.as_ref(), &prompt)
            .await
            .map_err(|e| PilotError::generation(e.to_string(), ""))?;

        let document = extract_document(&raw);
        let parsed = StepParser::new(&self.registry)
            .parse_str(&document)
            .map_err(|e| PilotError::generation(format!("unusable document: {}", e), raw.as_str()))?;
        if parsed.is_empty() {
            return Err(PilotError::generation("document has no steps", raw));
        }

        Ok((document, parsed.actions))
    }


    async fn verify(
        &self,
        intent: &str,
        document: &str,
        result: &WorkflowExecutionResult,
    ) -> (Verdict, Option<VerificationResult>) {
        let prompt = verification_prompt(intent, document, result);
        let answer = match self.ask(self.verifier.as_ref(), &prompt).await {
            Ok(raw) => parse_verification(&raw),
            Err(e) => Err(PilotError::Verification(e.to_string())),
        };

        match answer {
            Ok(verdict) if verdict.success => (Verdict::Verified, Some(verdict)),
            Ok(verdict) => (Verdict::Rejected, Some(verdict)),
            Err(e) => match self.feedback.verification_fallback {
                VerificationFallback::AssumeSuccess => {
                    warn!("verification unavailable, assuming success: {}", e);
                    (
                        Verdict::Verified,
                        Some(VerificationResult::assumed_success(e.to_string())),
                    )
                }
                VerificationFallback::AskUser => {
                    warn!("verification unavailable, asking user: {}", e);
                    (
                        Verdict::Unknown,
                        Some(VerificationResult::unverified(e.to_string())),
                    )
                }
            },
        }
    }

    /// Digest the page and rank alternative selectors after an empty extraction
    async fn diagnose(&self, intent: &str, cardinality: Cardinality, actions: &[Action]) -> Diagnostics {
        let digest = match self.collector.collect(false).await {
            Ok(digest) => Some(digest),
            Err(e) => {
                warn!("digest collection failed: {}", e);
                None
            }
        };

        let request = RankRequest::new(intent, cardinality).with_seeds(seed_selectors(actions));
        let candidates = self.ranker.rank(&request, digest.as_ref()).await;
        info!(
            patterns = digest.as_ref().map(|d| d.element_patterns.len()).unwrap_or(0),
            candidates = candidates.len(),
            "collected page diagnostics"
        );

        Diagnostics { digest, candidates }
    }

    async fn log_round(
        &self,
        result: &WorkflowExecutionResult,
        attempt: &Attempt,
        intent: &str,
        round: usize,
    ) -> Option<String> {
        let log = self.run_log.as_ref()?;
        let url = self.page.current_url().await.unwrap_or_default();
        let digest = attempt
            .diagnostics
            .as_ref()
            .and_then(|d| d.digest.clone())
            .or_else(|| self.collector.cached(&url));
        let entry = log
            .create_run_log(
                result,
                RunContext::new(url)
                    .with_digest(digest)
                    .with_intent(intent, round),
            )
            .await;
        Some(entry.id().to_string())
    }
}
