//! Browser capability interface
//!
//! Everything the executor, digest collector and selector ranker need from a
//! live page. All calls are asynchronous; the executor bounds each one with a
//! timeout.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::Result;

/// Page load milestone to wait for after navigation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WaitUntil {
    #[default]
    Load,
    DomContentLoaded,
    NetworkIdle,
}

impl WaitUntil {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Load => "load",
            Self::DomContentLoaded => "domcontentloaded",
            Self::NetworkIdle => "networkidle",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NavigateOptions {
    pub wait_until: WaitUntil,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClickOptions {
    pub button: String,
    pub click_count: u32,
}

impl Default for ClickOptions {
    fn default() -> Self {
        Self {
            button: "left".to_string(),
            click_count: 1,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TypeOptions {
    pub delay_ms: Option<u64>,
}

/// Condition a `wait` step blocks on
#[derive(Debug, Clone, PartialEq)]
pub enum WaitTarget {
    Selector(String),
    Text(String),
    Load(WaitUntil),
}

impl WaitTarget {
    /// Human-readable target, used in timeout failures
    pub fn describe(&self) -> String {
        match self {
            Self::Selector(selector) => selector.clone(),
            Self::Text(text) => format!("text \"{}\"", text),
            Self::Load(state) => format!("load state {}", state.as_str()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScreenshotOptions {
    pub path: Option<String>,
    pub full_page: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrollDirection {
    #[default]
    Down,
    Up,
    Top,
    Bottom,
}

impl ScrollDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Down => "down",
            Self::Up => "up",
            Self::Top => "top",
            Self::Bottom => "bottom",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScrollOptions {
    pub direction: ScrollDirection,
    pub pixels: Option<u32>,
    pub selector: Option<String>,
}

/// Expectation checked by an `assert` step
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assertion {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    #[serde(default = "default_exists")]
    pub exists: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_contains: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url_contains: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title_contains: Option<String>,
}

fn default_exists() -> bool {
    true
}

/// One element pulled from the page for structural digesting
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ElementSample {
    pub tag: String,
    #[serde(default)]
    pub classes: Vec<String>,
    #[serde(default)]
    pub id: Option<String>,
    /// Direct text content, only meaningful for leaf-like elements
    #[serde(default)]
    pub text: Option<String>,
    /// No element children
    #[serde(default)]
    pub leaf: bool,
}

/// Live match information for one selector
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SelectorMatches {
    pub count: usize,
    /// Text content of up to `limit` matches
    #[serde(default)]
    pub texts: Vec<String>,
}

/// Primitive operations on the single live page
#[async_trait]
pub trait BrowserCapability: Send + Sync {
    async fn navigate(&self, url: &str, opts: &NavigateOptions) -> Result<()>;

    async fn click(&self, selector: &str, opts: &ClickOptions) -> Result<()>;

    async fn type_text(&self, selector: &str, text: &str, opts: &TypeOptions) -> Result<()>;

    async fn wait_for(&self, target: &WaitTarget, timeout: Duration) -> Result<()>;

    /// Returns the saved path, or a short description when no path was given
    async fn screenshot(&self, opts: &ScreenshotOptions) -> Result<String>;

    async fn evaluate(&self, script: &str) -> Result<serde_json::Value>;

    async fn hover(&self, selector: &str) -> Result<()>;

    async fn select_option(&self, selector: &str, value: &str) -> Result<()>;

    async fn fill(&self, selector: &str, value: &str) -> Result<()>;

    async fn scroll(&self, opts: &ScrollOptions) -> Result<()>;

    /// Fails with a message describing the first unmet expectation
    async fn assert(&self, assertion: &Assertion) -> Result<()>;

    async fn current_url(&self) -> Result<String>;

    async fn title(&self) -> Result<String>;

    /// Count matches of `selector` and read up to `limit` of their texts
    async fn count_matches(&self, selector: &str, limit: usize) -> Result<SelectorMatches>;

    /// Sample up to `limit` elements in document order
    async fn sample_elements(&self, limit: usize) -> Result<Vec<ElementSample>>;
}
