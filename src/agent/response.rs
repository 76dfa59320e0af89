//! Reading oracle output
//!
//! Models wrap answers in prose and code fences. Generated documents are
//! taken from the first fenced block when there is one; verification verdicts
//! are the first balanced JSON object that parses.

use serde_json::Value;

use crate::core::{PilotError, Result, VerificationResult};

/// Suggestions kept from a rejecting verdict
pub const MAX_SUGGESTIONS: usize = 3;

const FENCE: &str = "```";

/// Body of the first fenced block, or the whole text
pub fn extract_document(raw: &str) -> String {
    if let Some(start) = raw.find(FENCE) {
        let after_fence = &raw[start + FENCE.len()..];
        let after_lang = after_fence.trim_start_matches(|c: char| c.is_alphanumeric() || c == '_');
        let block = match after_lang.find(FENCE) {
            Some(end) => &after_lang[..end],
            None => after_lang,
        };
        return block.trim_matches('\n').trim_end().to_string();
    }
    raw.trim().to_string()
}

/// End index (inclusive) of the balanced object starting at `start`
fn balanced_end(text: &str, start: usize) -> Option<usize> {
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escaped = false;

    for (idx, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(start + idx);
                }
            }
            _ => {}
        }
    }
    None
}

/// First balanced `{...}` in `raw` that parses as a JSON object
pub fn extract_json_object(raw: &str) -> Option<Value> {
    raw.match_indices('{').find_map(|(start, _)| {
        let end = balanced_end(raw, start)?;
        match serde_json::from_str::<Value>(&raw[start..=end]) {
            Ok(value @ Value::Object(_)) => Some(value),
            _ => None,
        }
    })
}

/// Parse a verifier answer into a verdict
pub fn parse_verification(raw: &str) -> Result<VerificationResult> {
    let value = extract_json_object(raw)
        .ok_or_else(|| PilotError::Verification(format!("no JSON verdict in: {}", preview(raw))))?;

    if !value.get("success").map(Value::is_boolean).unwrap_or(false) {
        return Err(PilotError::Verification(
            "verdict has no boolean 'success'".to_string(),
        ));
    }

    let mut result: VerificationResult = serde_json::from_value(value)
        .map_err(|e| PilotError::Verification(format!("malformed verdict: {}", e)))?;
    result.suggestions.retain(|s| !s.trim().is_empty());
    result.suggestions.truncate(MAX_SUGGESTIONS);
    Ok(result)
}

fn preview(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.chars().count() <= 120 {
        trimmed.to_string()
    } else {
        format!("{}...", trimmed.chars().take(120).collect::<String>())
    }
}

/// Whether extracted data is an empty collection. Null is not: it is what a
/// side-effect script returns.
pub fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::String(s) => {
            let s = s.trim();
            s == "[]" || s == "{}" || s.starts_with("0 items")
        }
        _ => false,
    }
}
