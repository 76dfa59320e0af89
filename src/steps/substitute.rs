//! `${NAME}` placeholder substitution
//!
//! Unknown names are left verbatim so a missing variable shows up as a failed
//! step at execution time instead of a parse error.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::Value;

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("placeholder pattern is valid")
});

/// Replace every known `${NAME}` in `input`
pub fn substitute(input: &str, vars: &HashMap<String, String>) -> String {
    if !input.contains("${") {
        return input.to_string();
    }

    PLACEHOLDER
        .replace_all(input, |caps: &Captures| match vars.get(&caps[1]) {
            Some(value) => value.clone(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// Substitute through every string leaf of an argument tree
pub fn substitute_value(value: &Value, vars: &HashMap<String, String>) -> Value {
    match value {
        Value::String(s) => Value::String(substitute(s, vars)),
        Value::Array(items) => Value::Array(items.iter().map(|v| substitute_value(v, vars)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), substitute_value(v, vars)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Placeholder names still present in an argument tree
pub fn unresolved(value: &Value) -> Vec<String> {
    let mut names = Vec::new();
    collect_unresolved(value, &mut names);
    names.sort();
    names.dedup();
    names
}

fn collect_unresolved(value: &Value, names: &mut Vec<String>) {
    match value {
        Value::String(s) => {
            names.extend(PLACEHOLDER.captures_iter(s).map(|caps| caps[1].to_string()));
        }
        Value::Array(items) => items.iter().for_each(|v| collect_unresolved(v, names)),
        Value::Object(map) => map.values().for_each(|v| collect_unresolved(v, names)),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_unknown_placeholder_left_verbatim() {
        assert_eq!(substitute("a${UNSET}b", &HashMap::new()), "a${UNSET}b");
    }

    #[test]
    fn test_no_placeholder_is_noop() {
        let env = vars(&[("X", "1")]);
        assert_eq!(substitute("plain $X {X}", &env), "plain $X {X}");
    }

    #[test]
    fn test_replaces_known_and_keeps_unknown() {
        let env = vars(&[("HOST", "x.test"), ("USER", "ada")]);
        assert_eq!(
            substitute("https://${HOST}/u/${USER}?t=${TOKEN}", &env),
            "https://x.test/u/ada?t=${TOKEN}"
        );
    }

    #[test]
    fn test_walks_nested_arrays_and_objects() {
        let env = vars(&[("Q", "rust")]);
        let tree = json!({
            "selector": "#q",
            "values": ["${Q}", 3, {"deep": "find ${Q}"}],
            "flag": true
        });
        let out = substitute_value(&tree, &env);
        assert_eq!(
            out,
            json!({
                "selector": "#q",
                "values": ["rust", 3, {"deep": "find rust"}],
                "flag": true
            })
        );
    }

    #[test]
    fn test_unresolved_lists_remaining_names() {
        let tree = json!({"a": "${B} and ${A}", "b": ["${A}"]});
        assert_eq!(unresolved(&tree), vec!["A".to_string(), "B".to_string()]);
    }
}
