//! Shared fakes for integration tests
//!
//! `FakeBrowser` is an in-memory page model, `ScriptedOracle` answers prompts
//! from a queue and `ScriptedDecider` replays user choices.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use pilot::agent::{AcceptChoice, Attempt, FeedbackDecider, RetryChoice};
use pilot::browser::{
    Assertion, BrowserCapability, ClickOptions, ElementSample, NavigateOptions, ScreenshotOptions,
    ScrollOptions, SelectorMatches, TypeOptions, WaitTarget,
};
use pilot::llm::Oracle;
use pilot::{PilotError, Result};

/// One page the fake browser can show
#[derive(Debug, Clone, Default)]
pub struct FakePage {
    pub title: String,
    /// Selector -> texts of its matches
    pub elements: HashMap<String, Vec<String>>,
    /// Selector -> URL a click on it navigates to
    pub links: HashMap<String, String>,
    /// Script needle -> value returned by `evaluate` when the script contains it
    pub scripts: Vec<(String, Value)>,
    pub samples: Vec<ElementSample>,
}

impl FakePage {
    pub fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            ..Default::default()
        }
    }

    pub fn element(mut self, selector: &str, texts: &[&str]) -> Self {
        self.elements
            .insert(selector.to_string(), texts.iter().map(|t| t.to_string()).collect());
        self
    }

    pub fn link(mut self, selector: &str, url: &str) -> Self {
        self.elements.entry(selector.to_string()).or_insert_with(|| vec![String::new()]);
        self.links.insert(selector.to_string(), url.to_string());
        self
    }

    pub fn script(mut self, needle: &str, value: Value) -> Self {
        self.scripts.push((needle.to_string(), value));
        self
    }

    /// Add `count` leaf samples of `tag.class` with numbered text
    pub fn samples(mut self, tag: &str, class: &str, count: usize) -> Self {
        for i in 0..count {
            self.samples.push(ElementSample {
                tag: tag.to_string(),
                classes: vec![class.to_string()],
                id: None,
                text: Some(format!("{} {}", class, i + 1)),
                leaf: true,
            });
        }
        self
    }
}

#[derive(Default)]
struct PageState {
    url: String,
    pages: HashMap<String, FakePage>,
}

impl PageState {
    fn page(&self) -> FakePage {
        self.pages.get(&self.url).cloned().unwrap_or_default()
    }
}

/// In-memory browser. Navigation swaps the current page; waiting on a
/// selector that is not present never resolves.
#[derive(Default)]
pub struct FakeBrowser {
    state: Mutex<PageState>,
    calls: Mutex<Vec<String>>,
    sample_calls: AtomicUsize,
}

impl FakeBrowser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(self, url: &str, page: FakePage) -> Self {
        self.state.lock().unwrap().pages.insert(url.to_string(), page);
        self
    }

    /// Start on `url` without recording a navigation
    pub fn at(self, url: &str) -> Self {
        self.state.lock().unwrap().url = url.to_string();
        self
    }

    /// Every operation performed, e.g. `click #next`
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_starting_with(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }

    pub fn sample_calls(&self) -> usize {
        self.sample_calls.load(Ordering::SeqCst)
    }

    pub fn url(&self) -> String {
        self.state.lock().unwrap().url.clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn require(&self, selector: &str) -> Result<()> {
        let page = self.state.lock().unwrap().page();
        match page.elements.get(selector) {
            Some(matches) if !matches.is_empty() => Ok(()),
            _ => Err(PilotError::browser(format!("no element matches '{}'", selector))),
        }
    }
}

#[async_trait]
impl BrowserCapability for FakeBrowser {
    async fn navigate(&self, url: &str, _opts: &NavigateOptions) -> Result<()> {
        self.record(format!("navigate {}", url));
        self.state.lock().unwrap().url = url.to_string();
        Ok(())
    }

    async fn click(&self, selector: &str, _opts: &ClickOptions) -> Result<()> {
        self.require(selector)?;
        self.record(format!("click {}", selector));
        let mut state = self.state.lock().unwrap();
        if let Some(url) = state.page().links.get(selector) {
            state.url = url.clone();
        }
        Ok(())
    }

    async fn type_text(&self, selector: &str, text: &str, _opts: &TypeOptions) -> Result<()> {
        self.require(selector)?;
        self.record(format!("type {} {}", selector, text));
        Ok(())
    }

    async fn wait_for(&self, target: &WaitTarget, _timeout: Duration) -> Result<()> {
        self.record(format!("wait {}", target.describe()));
        if let WaitTarget::Selector(selector) = target {
            if self.require(selector).is_err() {
                std::future::pending::<()>().await;
            }
        }
        Ok(())
    }

    async fn screenshot(&self, opts: &ScreenshotOptions) -> Result<String> {
        self.record("screenshot".to_string());
        Ok(opts.path.clone().unwrap_or_else(|| "screenshot taken".to_string()))
    }

    async fn evaluate(&self, script: &str) -> Result<Value> {
        self.record(format!("evaluate {}", script));
        let page = self.state.lock().unwrap().page();
        Ok(page
            .scripts
            .iter()
            .find(|(needle, _)| script.contains(needle.as_str()))
            .map(|(_, value)| value.clone())
            .unwrap_or(Value::Null))
    }

    async fn hover(&self, selector: &str) -> Result<()> {
        self.require(selector)?;
        self.record(format!("hover {}", selector));
        Ok(())
    }

    async fn select_option(&self, selector: &str, value: &str) -> Result<()> {
        self.require(selector)?;
        self.record(format!("select {} {}", selector, value));
        Ok(())
    }

    async fn fill(&self, selector: &str, value: &str) -> Result<()> {
        self.require(selector)?;
        self.record(format!("fill {} {}", selector, value));
        Ok(())
    }

    async fn scroll(&self, opts: &ScrollOptions) -> Result<()> {
        self.record(format!("scroll {}", opts.direction.as_str()));
        Ok(())
    }

    async fn assert(&self, assertion: &Assertion) -> Result<()> {
        self.record("assert".to_string());
        if let Some(ref selector) = assertion.selector {
            if self.require(selector).is_ok() != assertion.exists {
                return Err(PilotError::browser(format!("assertion failed on '{}'", selector)));
            }
        }
        if let Some(ref fragment) = assertion.url_contains {
            if !self.url().contains(fragment.as_str()) {
                return Err(PilotError::browser(format!("url does not contain '{}'", fragment)));
            }
        }
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self.url())
    }

    async fn title(&self) -> Result<String> {
        Ok(self.state.lock().unwrap().page().title)
    }

    async fn count_matches(&self, selector: &str, limit: usize) -> Result<SelectorMatches> {
        let page = self.state.lock().unwrap().page();
        let texts = page.elements.get(selector).cloned().unwrap_or_default();
        Ok(SelectorMatches {
            count: texts.len(),
            texts: texts.into_iter().take(limit).collect(),
        })
    }

    async fn sample_elements(&self, limit: usize) -> Result<Vec<ElementSample>> {
        self.sample_calls.fetch_add(1, Ordering::SeqCst);
        let page = self.state.lock().unwrap().page();
        Ok(page.samples.into_iter().take(limit).collect())
    }
}

/// Oracle answering from a queue and recording every prompt
#[derive(Default)]
pub struct ScriptedOracle {
    answers: Mutex<VecDeque<Result<String>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedOracle {
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            answers: Mutex::new(answers.into_iter().map(|a| Ok(a.into())).collect()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Oracle whose every call fails
    pub fn failing() -> Self {
        Self::default()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Oracle for ScriptedOracle {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.answers
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(PilotError::ollama("no scripted answer left")))
    }
}

/// Verifier answer in the JSON shape the loop expects
pub fn verdict(success: bool, reason: &str, suggestions: &[&str]) -> String {
    serde_json::json!({
        "success": success,
        "analysis": reason,
        "reason": reason,
        "suggestions": suggestions,
    })
    .to_string()
}

/// Generator answer wrapping a step document in a fence
pub fn fenced(document: &str) -> String {
    format!("Here are the steps:\n```yaml\n{}\n```\n", document.trim_end())
}

/// Decider replaying fixed choices; runs out into Abandon / Finish
#[derive(Default)]
pub struct ScriptedDecider {
    failures: Mutex<VecDeque<RetryChoice>>,
    successes: Mutex<VecDeque<AcceptChoice>>,
    confirm: bool,
    pub failure_calls: AtomicUsize,
    pub success_documents: Mutex<Vec<String>>,
}

impl ScriptedDecider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_failure(self, choices: impl IntoIterator<Item = RetryChoice>) -> Self {
        self.failures.lock().unwrap().extend(choices);
        self
    }

    pub fn on_success(self, choices: impl IntoIterator<Item = AcceptChoice>) -> Self {
        self.successes.lock().unwrap().extend(choices);
        self
    }

    pub fn confirming(mut self, confirm: bool) -> Self {
        self.confirm = confirm;
        self
    }
}

#[async_trait]
impl FeedbackDecider for ScriptedDecider {
    async fn after_failure(&self, _attempt: &Attempt) -> RetryChoice {
        self.failure_calls.fetch_add(1, Ordering::SeqCst);
        self.failures
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(RetryChoice::Abandon)
    }

    async fn after_success(&self, _attempt: &Attempt, document: &str) -> AcceptChoice {
        self.success_documents.lock().unwrap().push(document.to_string());
        self.successes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(AcceptChoice::Finish)
    }

    async fn confirm_unverified(&self, _attempt: &Attempt) -> bool {
        self.confirm
    }
}
