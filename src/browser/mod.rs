//! Browser automation module
//!
//! The capability trait consumed by the executor, and an agent-browser
//! implementation of it.

mod agent_browser;
pub mod capability;

pub use agent_browser::AgentBrowser;
pub use capability::{
    Assertion, BrowserCapability, ClickOptions, ElementSample, NavigateOptions, ScreenshotOptions,
    ScrollDirection, ScrollOptions, SelectorMatches, TypeOptions, WaitTarget, WaitUntil,
};
