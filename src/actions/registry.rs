//! Action registry - maps step kinds to handlers
//!
//! Every kind goes through the same two phases: `normalize` at parse time
//! turns shorthand or structured arguments into one canonical object, and
//! `execute` dispatches the canonical object to the browser.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::actions::handlers;
use crate::browser::BrowserCapability;
use crate::core::Result;
use crate::executor::ExecutionContext;

/// One dispatch of a handler
pub struct StepCall<'a> {
    /// Canonical arguments after variable substitution
    pub args: &'a Value,
    pub page: &'a dyn BrowserCapability,
    /// Budget for this step, used by handlers that wait
    pub timeout: Duration,
    pub step: usize,
}

#[async_trait]
pub trait ActionHandler: Send + Sync {
    /// Step kind this handler owns
    fn kind(&self) -> &'static str;

    /// Accepted argument shapes, shown to the generator and in `--help` output
    fn usage(&self) -> &'static str;

    /// Validate raw arguments and produce the canonical object
    fn normalize(&self, raw: &Value) -> std::result::Result<Value, String>;

    /// Selector or condition named in failure messages
    fn target(&self, args: &Value) -> Option<String> {
        ["selector", "url", "key", "script"]
            .iter()
            .find_map(|key| args.get(*key).and_then(Value::as_str))
            .map(str::to_string)
    }

    /// Whether this kind pulls data out of the page
    fn extracts_data(&self) -> bool {
        false
    }

    /// Run the step. The returned value becomes the step's output.
    async fn execute(&self, call: &StepCall<'_>, ctx: &mut ExecutionContext) -> Result<Option<Value>>;
}

/// Registry of step handlers keyed by kind
#[derive(Clone)]
pub struct ActionRegistry {
    handlers: HashMap<String, Arc<dyn ActionHandler>>,
}

impl ActionRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Registry with every built-in kind
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(handlers::Navigate);
        registry.register(handlers::Click);
        registry.register(handlers::Type);
        registry.register(handlers::Wait);
        registry.register(handlers::Screenshot);
        registry.register(handlers::Evaluate);
        registry.register(handlers::Hover);
        registry.register(handlers::Select);
        registry.register(handlers::Fill);
        registry.register(handlers::Scroll);
        registry.register(handlers::Assert);
        registry.register(handlers::Store);
        registry
    }

    /// Register a handler, replacing any existing one for the same kind
    pub fn register(&mut self, handler: impl ActionHandler + 'static) {
        self.handlers
            .insert(handler.kind().to_string(), Arc::new(handler));
    }

    pub fn get(&self, kind: &str) -> Option<Arc<dyn ActionHandler>> {
        self.handlers.get(kind).cloned()
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.handlers.contains_key(kind)
    }

    /// Registered kinds, sorted
    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }

    /// `- kind: usage` lines for prompts
    pub fn usage_lines(&self) -> String {
        self.kinds()
            .into_iter()
            .filter_map(|kind| self.handlers.get(kind))
            .map(|h| format!("- {}: {}", h.kind(), h.usage()))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Whether `kind` is a data-extraction kind
    pub fn is_extraction(&self, kind: &str) -> bool {
        self.handlers
            .get(kind)
            .map(|h| h.extracts_data())
            .unwrap_or(false)
    }
}

impl Default for ActionRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
