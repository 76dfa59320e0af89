//! Step document parser
//!
//! A document is an ordered list of single-key mappings, e.g.
//!
//! ```yaml
//! - navigate: https://x.test
//! - click: "#submit"
//! - type: { selector: "#q", text: "${QUERY}" }
//! ```
//!
//! Parsing is pure: it checks kinds against the registry and lets each
//! handler normalize its shorthand or structured arguments.

use serde_json::Value;
use serde_yaml::Value as YamlValue;
use tracing::warn;

use crate::actions::ActionRegistry;
use crate::core::{PilotError, Result};
use crate::steps::action::{Action, ParsedDocument};

pub struct StepParser<'a> {
    registry: &'a ActionRegistry,
}

fn raw(value: &YamlValue) -> String {
    serde_yaml::to_string(value).unwrap_or_else(|_| format!("{:?}", value))
}

/// Pull a `timeout` key out of structured arguments
fn lift_timeout(args: &mut Value, step: usize, kind: &str) -> std::result::Result<Option<u64>, String> {
    let Some(map) = args.as_object_mut() else {
        return Ok(None);
    };
    let Some(timeout) = map.remove("timeout") else {
        return Ok(None);
    };
    let ms = match &timeout {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    };
    ms.map(Some).ok_or_else(|| {
        format!(
            "step {} ({}): timeout must be a non-negative number of milliseconds, got {}",
            step, kind, timeout
        )
    })
}

impl<'a> StepParser<'a> {
    pub fn new(registry: &'a ActionRegistry) -> Self {
        Self { registry }
    }

    /// Parse YAML (or JSON) text
    pub fn parse_str(&self, text: &str) -> Result<ParsedDocument> {
        let doc: YamlValue = serde_yaml::from_str(text)
            .map_err(|e| PilotError::parse(format!("invalid step document: {}", e), text))?;
        self.parse_value(&doc)
    }

    /// Parse an already-deserialized document
    pub fn parse_value(&self, doc: &YamlValue) -> Result<ParsedDocument> {
        let entries = doc.as_sequence().ok_or_else(|| {
            PilotError::parse("step document must be a list of steps", raw(doc))
        })?;

        let mut parsed = ParsedDocument::default();

        for (i, entry) in entries.iter().enumerate() {
            let step = i + 1;
            let action = self.parse_entry(entry, step, &mut parsed.warnings)?;
            parsed.actions.push(action);
        }

        Ok(parsed)
    }

    fn parse_entry(
        &self,
        entry: &YamlValue,
        step: usize,
        warnings: &mut Vec<String>,
    ) -> Result<Action> {
        let mapping = entry.as_mapping().ok_or_else(|| {
            PilotError::parse(
                format!("step {}: expected a single-key mapping like `- click: \"#id\"`", step),
                raw(entry),
            )
        })?;

        let (key, value) = mapping
            .iter()
            .next()
            .ok_or_else(|| PilotError::parse(format!("step {}: empty mapping", step), raw(entry)))?;

        let kind = key.as_str().ok_or_else(|| {
            PilotError::parse(format!("step {}: action kind must be a string", step), raw(entry))
        })?;

        if mapping.len() > 1 {
            let ignored: Vec<String> = mapping
                .iter()
                .skip(1)
                .map(|(k, _)| k.as_str().map(str::to_string).unwrap_or_else(|| raw(k).trim().to_string()))
                .collect();
            let message = format!(
                "step {}: mapping has {} keys; only '{}' executes (ignored: {})",
                step,
                mapping.len(),
                kind,
                ignored.join(", ")
            );
            warn!("{}", message);
            warnings.push(message);
        }

        let handler = self
            .registry
            .get(kind)
            .ok_or_else(|| PilotError::UnknownCommand {
                kind: kind.to_string(),
                step,
            })?;

        let mut args = serde_json::to_value(value).map_err(|e| {
            PilotError::parse(format!("step {} ({}): {}", step, kind, e), raw(entry))
        })?;

        let timeout_ms =
            lift_timeout(&mut args, step, kind).map_err(|msg| PilotError::parse(msg, raw(entry)))?;

        let arguments = handler.normalize(&args).map_err(|reason| {
            PilotError::parse(format!("step {} ({}): {}", step, kind, reason), raw(entry))
        })?;

        Ok(Action {
            kind: kind.to_string(),
            arguments,
            step_index: step,
            timeout_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(text: &str) -> Result<ParsedDocument> {
        let registry = ActionRegistry::with_defaults();
        StepParser::new(&registry).parse_str(text)
    }

    #[test]
    fn test_shorthand_and_structured_normalize_identically() {
        let short = parse("- navigate: https://x.test").unwrap();
        let long = parse("- navigate: { url: \"https://x.test\", waitUntil: load }").unwrap();
        assert_eq!(short.actions, long.actions);
        assert_eq!(
            short.actions[0].arguments,
            json!({"url": "https://x.test", "waitUntil": "load"})
        );
    }

    #[test]
    fn test_parsing_is_deterministic() {
        let doc = r##"
- navigate: https://x.test
- click: "#go"
- type: { selector: "#q", text: "${Q}" }
- wait: 250
- evaluate: "document.title"
"##;
        assert_eq!(parse(doc).unwrap(), parse(doc).unwrap());
    }

    #[test]
    fn test_step_indices_follow_document_order() {
        let doc = parse("- navigate: https://x.test\n- hover: a\n- scroll: bottom").unwrap();
        let indices: Vec<usize> = doc.actions.iter().map(|a| a.step_index).collect();
        assert_eq!(indices, vec![1, 2, 3]);
    }

    #[test]
    fn test_unknown_kind_names_step() {
        let err = parse("- navigate: https://x.test\n- teleport: mars").unwrap_err();
        match err {
            PilotError::UnknownCommand { kind, step } => {
                assert_eq!(kind, "teleport");
                assert_eq!(step, 2);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_non_list_top_level_is_parse_error() {
        let err = parse("navigate: https://x.test").unwrap_err();
        match err {
            PilotError::Parse { content, .. } => assert!(content.contains("navigate")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_multi_key_mapping_keeps_first_with_warning() {
        let doc = parse("- click: \"#a\"\n  hover: \"#b\"").unwrap();
        assert_eq!(doc.actions.len(), 1);
        assert_eq!(doc.actions[0].kind, "click");
        assert_eq!(doc.warnings.len(), 1);
        assert!(doc.warnings[0].contains("hover"));
    }

    #[test]
    fn test_timeout_is_lifted_out_of_arguments() {
        let doc = parse("- wait: { selector: .row, timeout: 1500 }").unwrap();
        assert_eq!(doc.actions[0].timeout_ms, Some(1500));
        assert_eq!(doc.actions[0].arguments, json!({"selector": ".row"}));
    }

    #[test]
    fn test_invalid_arguments_report_step_and_kind() {
        let err = parse("- navigate: https://x.test\n- type: \"#q\"").unwrap_err();
        match err {
            PilotError::Parse { message, .. } => {
                assert!(message.contains("step 2"));
                assert!(message.contains("type"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_json_documents_are_accepted() {
        let doc = parse(r##"[{"navigate": "https://x.test"}, {"click": "#missing"}]"##).unwrap();
        assert_eq!(doc.actions.len(), 2);
        assert_eq!(doc.actions[1].get_str("selector"), Some("#missing"));
    }
}
