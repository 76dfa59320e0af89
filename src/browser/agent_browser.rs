//! Browser capability backed by the agent-browser CLI
//!
//! Each primitive maps onto one agent-browser command. Structural queries
//! (match counts, element sampling, assertions) run as evaluated scripts.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tracing::debug;

use crate::browser::capability::{
    Assertion, BrowserCapability, ClickOptions, ElementSample, NavigateOptions, ScreenshotOptions,
    ScrollOptions, SelectorMatches, TypeOptions, WaitTarget,
};
use crate::core::config::BrowserConfig;
use crate::core::{PilotError, Result};

/// Driver for a named agent-browser session
pub struct AgentBrowser {
    binary: String,
    /// Session name for isolation
    session_name: String,
    /// Whether to run in headed mode
    headed: bool,
}

#[derive(Debug, Deserialize)]
struct AssertReport {
    ok: bool,
    #[serde(default)]
    message: String,
}

impl AgentBrowser {
    /// Create a driver for the given session
    pub fn new(session_name: impl Into<String>) -> Self {
        Self {
            binary: "agent-browser".to_string(),
            session_name: session_name.into(),
            headed: false,
        }
    }

    pub fn from_config(config: &BrowserConfig) -> Self {
        Self {
            binary: config.binary.clone(),
            session_name: config.session_name.clone(),
            headed: config.headed,
        }
    }

    /// Set headed mode
    pub fn set_headed(&mut self, headed: bool) {
        self.headed = headed;
    }

    /// Check if agent-browser is installed
    pub async fn is_available(&self) -> bool {
        Command::new(&self.binary)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false)
    }

    /// Run an agent-browser command and return stdout
    async fn run_command(&self, args: &[&str]) -> Result<String> {
        let mut cmd = Command::new(&self.binary);
        cmd.args(["--session", &self.session_name]);

        if self.headed {
            cmd.arg("--headed");
        }

        cmd.args(args);
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);

        debug!(target: "pilot::browser", ?args, "agent-browser");

        let output = cmd.output().await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                PilotError::AgentBrowserNotFound
            } else {
                PilotError::browser(format!("Failed to run agent-browser: {}", e))
            }
        })?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(PilotError::browser(format!(
                "agent-browser {} failed: {}",
                args.first().copied().unwrap_or_default(),
                stderr.trim()
            )))
        }
    }

    /// Evaluate a script and deserialize its JSON result
    async fn eval_json<T: serde::de::DeserializeOwned>(&self, script: &str) -> Result<T> {
        let value = self.evaluate(script).await?;
        let value = match value {
            // Some builds print the JSON result as a quoted string
            serde_json::Value::String(s) => serde_json::from_str(&s)?,
            other => other,
        };
        Ok(serde_json::from_value(value)?)
    }
}

impl Default for AgentBrowser {
    fn default() -> Self {
        Self::new("pilot")
    }
}

/// Quote a string as a JavaScript literal
fn js_string(s: &str) -> String {
    serde_json::Value::String(s.to_string()).to_string()
}

fn count_script(selector: &str, limit: usize) -> String {
    format!(
        r#"(() => {{
  const nodes = Array.from(document.querySelectorAll({sel}));
  return JSON.stringify({{
    count: nodes.length,
    texts: nodes.slice(0, {limit}).map(n => (n.innerText || n.textContent || '').trim())
  }});
}})()"#,
        sel = js_string(selector),
        limit = limit
    )
}

fn sample_script(limit: usize) -> String {
    format!(
        r#"(() => {{
  const out = [];
  const walker = document.createTreeWalker(document.body || document.documentElement, NodeFilter.SHOW_ELEMENT);
  let node = walker.currentNode;
  while (node && out.length < {limit}) {{
    const tag = node.tagName.toLowerCase();
    if (tag !== 'script' && tag !== 'style' && tag !== 'noscript') {{
      const leaf = node.children.length === 0;
      out.push({{
        tag,
        classes: Array.from(node.classList || []),
        id: node.id || null,
        text: leaf ? (node.textContent || '').trim().slice(0, 200) : null,
        leaf
      }});
    }}
    node = walker.nextNode();
  }}
  return JSON.stringify(out);
}})()"#,
        limit = limit
    )
}

fn assert_script(assertion: &Assertion) -> String {
    let spec = serde_json::to_string(assertion).unwrap_or_else(|_| "{}".to_string());
    format!(
        r#"(() => {{
  const a = {spec};
  if (a.urlContains && !location.href.includes(a.urlContains))
    return JSON.stringify({{ ok: false, message: 'url ' + location.href + ' does not contain ' + a.urlContains }});
  if (a.titleContains && !document.title.includes(a.titleContains))
    return JSON.stringify({{ ok: false, message: 'title ' + document.title + ' does not contain ' + a.titleContains }});
  if (a.selector) {{
    const el = document.querySelector(a.selector);
    if (a.exists === false) {{
      if (el) return JSON.stringify({{ ok: false, message: a.selector + ' exists' }});
    }} else {{
      if (!el) return JSON.stringify({{ ok: false, message: a.selector + ' not found' }});
      const text = (el.innerText || el.textContent || '');
      if (a.textContains && !text.includes(a.textContains))
        return JSON.stringify({{ ok: false, message: a.selector + ' text does not contain ' + a.textContains }});
    }}
  }}
  return JSON.stringify({{ ok: true }});
}})()"#,
        spec = spec
    )
}

#[async_trait]
impl BrowserCapability for AgentBrowser {
    async fn navigate(&self, url: &str, opts: &NavigateOptions) -> Result<()> {
        self.run_command(&["open", url]).await?;
        self.run_command(&["wait", "--load", opts.wait_until.as_str()])
            .await?;
        Ok(())
    }

    async fn click(&self, selector: &str, opts: &ClickOptions) -> Result<()> {
        if opts.click_count > 1 {
            self.run_command(&["dblclick", selector]).await?;
        } else {
            self.run_command(&["click", selector]).await?;
        }
        Ok(())
    }

    async fn type_text(&self, selector: &str, text: &str, _opts: &TypeOptions) -> Result<()> {
        self.run_command(&["type", selector, text]).await?;
        Ok(())
    }

    async fn wait_for(&self, target: &WaitTarget, timeout: Duration) -> Result<()> {
        let timeout_ms = timeout.as_millis().to_string();
        match target {
            WaitTarget::Selector(selector) => {
                self.run_command(&["wait", selector.as_str(), "--timeout", timeout_ms.as_str()])
                    .await?
            }
            WaitTarget::Text(text) => {
                self.run_command(&["wait", "--text", text.as_str(), "--timeout", timeout_ms.as_str()])
                    .await?
            }
            WaitTarget::Load(state) => {
                self.run_command(&["wait", "--load", state.as_str()])
                    .await?
            }
        };
        Ok(())
    }

    async fn screenshot(&self, opts: &ScreenshotOptions) -> Result<String> {
        let mut args = vec!["screenshot"];

        if let Some(ref p) = opts.path {
            args.push(p.as_str());
        }

        if opts.full_page {
            args.push("--full");
        }

        let output = self.run_command(&args).await?;

        Ok(match opts.path {
            Some(ref p) => format!("Screenshot saved to {}", p),
            None => format!("Screenshot captured ({} bytes base64)", output.trim().len()),
        })
    }

    async fn evaluate(&self, script: &str) -> Result<serde_json::Value> {
        let output = self.run_command(&["eval", script]).await?;
        let trimmed = output.trim();
        Ok(serde_json::from_str(trimmed)
            .unwrap_or_else(|_| serde_json::Value::String(trimmed.to_string())))
    }

    async fn hover(&self, selector: &str) -> Result<()> {
        self.run_command(&["hover", selector]).await?;
        Ok(())
    }

    async fn select_option(&self, selector: &str, value: &str) -> Result<()> {
        self.run_command(&["select", selector, value]).await?;
        Ok(())
    }

    async fn fill(&self, selector: &str, value: &str) -> Result<()> {
        self.run_command(&["fill", selector, value]).await?;
        Ok(())
    }

    async fn scroll(&self, opts: &ScrollOptions) -> Result<()> {
        if let Some(ref selector) = opts.selector {
            self.run_command(&["scrollintoview", selector.as_str()]).await?;
            return Ok(());
        }

        let mut args = vec!["scroll", opts.direction.as_str()];
        let px_str;

        if let Some(px) = opts.pixels {
            px_str = px.to_string();
            args.push(&px_str);
        }

        self.run_command(&args).await?;
        Ok(())
    }

    async fn assert(&self, assertion: &Assertion) -> Result<()> {
        let report: AssertReport = self.eval_json(&assert_script(assertion)).await?;
        if report.ok {
            Ok(())
        } else {
            Err(PilotError::browser(format!(
                "assertion failed: {}",
                report.message
            )))
        }
    }

    async fn current_url(&self) -> Result<String> {
        self.run_command(&["get", "url"])
            .await
            .map(|s| s.trim().to_string())
    }

    async fn title(&self) -> Result<String> {
        self.run_command(&["get", "title"])
            .await
            .map(|s| s.trim().to_string())
    }

    async fn count_matches(&self, selector: &str, limit: usize) -> Result<SelectorMatches> {
        self.eval_json(&count_script(selector, limit)).await
    }

    async fn sample_elements(&self, limit: usize) -> Result<Vec<ElementSample>> {
        self.eval_json(&sample_script(limit)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_driver_creation() {
        let browser = AgentBrowser::new("test-session");
        assert_eq!(browser.session_name, "test-session");
        assert!(!browser.headed);
    }

    #[test]
    fn test_scripts_quote_selectors() {
        let script = count_script("a[href=\"x\"]", 5);
        assert!(script.contains(r#""a[href=\"x\"]""#));
        assert!(script.contains("slice(0, 5)"));
    }

    #[test]
    fn test_assert_script_embeds_expectation() {
        let script = assert_script(&Assertion {
            selector: Some("#done".into()),
            exists: true,
            ..Default::default()
        });
        assert!(script.contains("\"selector\":\"#done\""));
    }
}
