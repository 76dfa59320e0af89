//! Action executor
//!
//! Runs actions in document order against one live page. Each dispatch is
//! bounded by a timeout. The executor never retries; the feedback loop owns
//! retry.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::actions::{ActionRegistry, StepCall};
use crate::browser::BrowserCapability;
use crate::core::{Config, ExecutionResult, PilotError, Result, StepFailure, WorkflowExecutionResult};
use crate::executor::ExecutionContext;
use crate::steps::substitute::{substitute_value, unresolved};
use crate::steps::Action;

/// What happens after a step fails
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Abort on the first failure
    Strict,
    /// Record the failure and keep going
    ContinueOnError,
}

impl FailurePolicy {
    pub fn from_strict(strict: bool) -> Self {
        if strict {
            Self::Strict
        } else {
            Self::ContinueOnError
        }
    }
}

pub struct ActionExecutor {
    registry: Arc<ActionRegistry>,
    page: Arc<dyn BrowserCapability>,
    policy: FailurePolicy,
    /// Used when an action carries no timeout of its own
    action_timeout: Duration,
    output_limit: usize,
}

impl ActionExecutor {
    pub fn new(registry: Arc<ActionRegistry>, page: Arc<dyn BrowserCapability>) -> Self {
        Self {
            registry,
            page,
            policy: FailurePolicy::Strict,
            action_timeout: Duration::from_secs(30),
            output_limit: 500,
        }
    }

    pub fn from_config(
        registry: Arc<ActionRegistry>,
        page: Arc<dyn BrowserCapability>,
        config: &Config,
    ) -> Self {
        Self::new(registry, page)
            .with_policy(FailurePolicy::from_strict(config.executor.strict))
            .with_timeout(config.action_timeout())
            .with_output_limit(config.executor.output_limit)
    }

    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.action_timeout = timeout;
        self
    }

    pub fn with_output_limit(mut self, limit: usize) -> Self {
        self.output_limit = limit;
        self
    }

    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    /// Execute `actions` in order.
    ///
    /// Under [`FailurePolicy::Strict`] the first failure returns
    /// [`PilotError::ActionFailure`] with the results recorded so far. An
    /// action whose kind is not registered is always fatal.
    pub async fn execute(
        &self,
        actions: &[Action],
        ctx: &mut ExecutionContext,
    ) -> Result<WorkflowExecutionResult> {
        let started = Instant::now();
        let mut steps = Vec::with_capacity(actions.len());

        for (i, action) in actions.iter().enumerate() {
            let step = i + 1;
            match self.run_step(step, action, ctx).await? {
                Ok(result) => steps.push(result),
                Err((failure, result)) => {
                    steps.push(result);
                    if self.policy == FailurePolicy::Strict {
                        warn!("aborting run: {}", failure);
                        let partial = WorkflowExecutionResult::from_steps(
                            steps,
                            elapsed_ms(started),
                        );
                        return Err(PilotError::ActionFailure {
                            failure,
                            partial: Box::new(partial),
                        });
                    }
                    debug!("continuing after failure: {}", failure);
                }
            }
        }

        let result = WorkflowExecutionResult::from_steps(steps, elapsed_ms(started));
        info!(
            total = result.total_steps,
            succeeded = result.successful_steps,
            failed = result.failed_steps,
            duration_ms = result.total_duration_ms,
            "run finished"
        );
        Ok(result)
    }

    /// Dispatch one action. The outer error is fatal for the whole run; the
    /// inner one is a recorded step failure.
    async fn run_step(
        &self,
        step: usize,
        action: &Action,
        ctx: &mut ExecutionContext,
    ) -> Result<std::result::Result<ExecutionResult, (StepFailure, ExecutionResult)>> {
        let handler = self
            .registry
            .get(&action.kind)
            .ok_or_else(|| PilotError::UnknownCommand {
                kind: action.kind.clone(),
                step,
            })?;

        let args = substitute_value(&action.arguments, ctx.variables());
        let missing = unresolved(&args);
        if !missing.is_empty() {
            debug!(step, kind = %action.kind, ?missing, "unresolved placeholders");
        }

        let target = handler.target(&args);
        let timeout = action
            .timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(self.action_timeout);

        debug!(step, kind = %action.kind, target = ?target, "dispatch");

        let call = StepCall {
            args: &args,
            page: self.page.as_ref(),
            timeout,
            step,
        };

        let started = Instant::now();
        let outcome = tokio::time::timeout(timeout, handler.execute(&call, ctx)).await;
        let duration_ms = elapsed_ms(started);

        let failure = match outcome {
            Ok(Ok(value)) => {
                let (output, data) = match value {
                    Some(value) => {
                        ctx.set_last_output(value.clone());
                        (summarize_output(&value, self.output_limit), Some(value))
                    }
                    None => (None, None),
                };
                return Ok(Ok(ExecutionResult::success(
                    step,
                    &action.kind,
                    duration_ms,
                    output,
                    data,
                )));
            }
            Ok(Err(e)) => StepFailure::Action {
                step,
                kind: action.kind.clone(),
                target,
                message: e.to_string(),
            },
            Err(_) => StepFailure::Timeout {
                step,
                kind: action.kind.clone(),
                target,
                timeout_ms: timeout.as_millis() as u64,
            },
        };

        let result = ExecutionResult::failure(step, &action.kind, duration_ms, failure.to_string());
        Ok(Err((failure, result)))
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

/// Short textual form of a step's return value
pub fn summarize_output(value: &Value, limit: usize) -> Option<String> {
    let text = match value {
        Value::Null => return None,
        Value::String(s) => s.clone(),
        Value::Array(items) => format!("{} items: {}", items.len(), value),
        other => other.to_string(),
    };
    Some(truncate(&text, limit))
}

fn truncate(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let mut out: String = text.chars().take(limit).collect();
    out.push_str("...");
    out
}
