//! Prompt builders for the generation and verification oracles

use crate::actions::ActionRegistry;
use crate::agent::loop_state::AttemptHistory;
use crate::core::WorkflowExecutionResult;

/// System prompt for the generator model
pub const GENERATOR_SYSTEM_PROMPT: &str = "You write browser automation workflows as YAML step lists. \
Reply with a single ```yaml block and nothing else.";

/// System prompt for the verifier model
pub const VERIFIER_SYSTEM_PROMPT: &str = "You judge whether a browser automation run achieved what the user asked for. \
Reply with one JSON object.";

/// Page the workflow being extended has left the browser on
pub struct ExtendContext<'a> {
    pub accepted_document: &'a str,
    pub current_url: &'a str,
}

pub fn generation_prompt(
    intent: &str,
    registry: &ActionRegistry,
    history: &AttemptHistory,
    extend: Option<&ExtendContext<'_>>,
) -> String {
    let mut prompt = format!(
        "Write the steps for this task:\n{}\n\n\
## Format\n\
A YAML list. Each entry is a mapping with exactly one key, the action kind.\n\
Use `${{NAME}}` to reference stored variables.\n\n\
## Actions\n{}\n",
        intent.trim(),
        registry.usage_lines()
    );

    if let Some(extend) = extend {
        prompt.push_str(&format!(
            "\n## Continue an existing workflow\n\
These steps already ran and the browser is now on {}:\n{}\n\
Emit ONLY the new steps. Do not navigate back or repeat any step above.\n",
            extend.current_url,
            extend.accepted_document.trim_end()
        ));
    }

    prompt.push_str(&history.format_for_prompt());

    if !history.current_segment().is_empty() {
        prompt.push_str(
            "\nThe attempts above did not satisfy the task. Fix what went wrong; \
when a selector matched nothing, prefer the listed candidates with a non-zero count.\n",
        );
    }

    prompt
}

pub fn verification_prompt(intent: &str, document: &str, result: &WorkflowExecutionResult) -> String {
    format!(
        "Task:\n{}\n\nSteps:\n{}\n\nExecution:\n{}\n\n\
Did the run accomplish the task? Answer with JSON:\n\
{{\"success\": true|false, \"analysis\": \"what happened\", \"reason\": \"why\", \
\"suggestions\": [\"up to 3 concrete fixes when success is false\"]}}",
        intent.trim(),
        document.trim_end(),
        result.summary()
    )
}
