//! Execution context threaded through a run
//!
//! Holds the variables `${NAME}` placeholders resolve against and the raw
//! value of the most recent step that returned one. `store` steps write here.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::Result;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionContext {
    variables: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_output: Option<Value>,
}

/// String form used when a JSON value becomes a variable
fn value_to_variable(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the context with initial variables
    pub fn with_variables(variables: HashMap<String, String>) -> Self {
        Self {
            variables,
            last_output: None,
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.variables.get(key).map(String::as_str)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.variables.insert(key.into(), value.into());
    }

    /// Store a JSON value under `key`, stringified for substitution
    pub fn store_value(&mut self, key: impl Into<String>, value: &Value) {
        self.variables.insert(key.into(), value_to_variable(value));
    }

    pub fn variables(&self) -> &HashMap<String, String> {
        &self.variables
    }

    pub fn last_output(&self) -> Option<&Value> {
        self.last_output.as_ref()
    }

    pub(crate) fn set_last_output(&mut self, value: Value) {
        self.last_output = Some(value);
    }

    /// Serialize for hand-off to another process
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_store_value_stringifies() {
        let mut ctx = ExecutionContext::new();
        ctx.store_value("name", &json!("Ada"));
        ctx.store_value("count", &json!(3));
        ctx.store_value("items", &json!(["a", "b"]));
        assert_eq!(ctx.get("name"), Some("Ada"));
        assert_eq!(ctx.get("count"), Some("3"));
        assert_eq!(ctx.get("items"), Some(r#"["a","b"]"#));
    }

    #[test]
    fn test_json_persistence() {
        let mut ctx = ExecutionContext::new();
        ctx.set("TOKEN", "abc");
        ctx.set_last_output(json!({"ok": true}));
        let restored = ExecutionContext::from_json(&ctx.to_json().unwrap()).unwrap();
        assert_eq!(restored, ctx);
    }
}
