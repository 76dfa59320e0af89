//! Built-in step handlers
//!
//! Each handler owns a typed argument struct. The canonical form of a step is
//! that struct serialized back to JSON, so shorthand and structured input end
//! up identical.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::actions::registry::{ActionHandler, StepCall};
use crate::browser::{
    Assertion, ClickOptions, NavigateOptions, ScreenshotOptions, ScrollDirection, ScrollOptions,
    TypeOptions, WaitTarget, WaitUntil,
};
use crate::core::{PilotError, Result};
use crate::executor::ExecutionContext;

type NormalizeResult = std::result::Result<Value, String>;

fn canonical<T: Serialize>(args: &T) -> NormalizeResult {
    serde_json::to_value(args).map_err(|e| e.to_string())
}

fn from_object<T: DeserializeOwned>(raw: &Value) -> std::result::Result<T, String> {
    serde_json::from_value(raw.clone()).map_err(|e| e.to_string())
}

/// Decode canonical arguments at dispatch time
fn decode<T: DeserializeOwned>(call: &StepCall<'_>) -> Result<T> {
    serde_json::from_value(call.args.clone())
        .map_err(|e| PilotError::Other(format!("invalid arguments: {}", e)))
}

fn js_string(s: &str) -> String {
    Value::String(s.to_string()).to_string()
}

fn default_button() -> String {
    "left".to_string()
}

fn default_click_count() -> u32 {
    1
}

fn default_exists() -> bool {
    true
}

// navigate

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct NavigateArgs {
    url: String,
    #[serde(default)]
    wait_until: WaitUntil,
}

pub struct Navigate;

#[async_trait]
impl ActionHandler for Navigate {
    fn kind(&self) -> &'static str {
        "navigate"
    }

    fn usage(&self) -> &'static str {
        "<url> | {url, waitUntil: load|domcontentloaded|networkidle}"
    }

    fn normalize(&self, raw: &Value) -> NormalizeResult {
        let args = match raw {
            Value::String(url) => NavigateArgs {
                url: url.clone(),
                wait_until: WaitUntil::default(),
            },
            Value::Object(_) => from_object(raw)?,
            _ => return Err("expected a URL string or {url, waitUntil}".into()),
        };
        if args.url.trim().is_empty() {
            return Err("url must not be empty".into());
        }
        canonical(&args)
    }

    async fn execute(&self, call: &StepCall<'_>, _ctx: &mut ExecutionContext) -> Result<Option<Value>> {
        let args: NavigateArgs = decode(call)?;
        url::Url::parse(&args.url)
            .map_err(|e| PilotError::Other(format!("invalid URL '{}': {}", args.url, e)))?;
        call.page
            .navigate(
                &args.url,
                &NavigateOptions {
                    wait_until: args.wait_until,
                },
            )
            .await?;
        Ok(None)
    }
}

// click

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct ClickArgs {
    selector: String,
    #[serde(default = "default_button")]
    button: String,
    #[serde(default = "default_click_count")]
    click_count: u32,
}

pub struct Click;

#[async_trait]
impl ActionHandler for Click {
    fn kind(&self) -> &'static str {
        "click"
    }

    fn usage(&self) -> &'static str {
        "<selector> | {selector, button, clickCount}"
    }

    fn normalize(&self, raw: &Value) -> NormalizeResult {
        let args = match raw {
            Value::String(selector) => ClickArgs {
                selector: selector.clone(),
                button: default_button(),
                click_count: default_click_count(),
            },
            Value::Object(_) => from_object(raw)?,
            _ => return Err("expected a selector string or {selector, button, clickCount}".into()),
        };
        canonical(&args)
    }

    async fn execute(&self, call: &StepCall<'_>, _ctx: &mut ExecutionContext) -> Result<Option<Value>> {
        let args: ClickArgs = decode(call)?;
        let opts = ClickOptions {
            button: args.button,
            click_count: args.click_count,
        };
        call.page.click(&args.selector, &opts).await?;
        Ok(None)
    }
}

// type

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct TypeArgs {
    selector: String,
    text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    delay_ms: Option<u64>,
}

pub struct Type;

#[async_trait]
impl ActionHandler for Type {
    fn kind(&self) -> &'static str {
        "type"
    }

    fn usage(&self) -> &'static str {
        "{selector, text, delayMs?}"
    }

    fn normalize(&self, raw: &Value) -> NormalizeResult {
        if !raw.is_object() {
            return Err("expected {selector, text}".into());
        }
        canonical(&from_object::<TypeArgs>(raw)?)
    }

    async fn execute(&self, call: &StepCall<'_>, _ctx: &mut ExecutionContext) -> Result<Option<Value>> {
        let args: TypeArgs = decode(call)?;
        let opts = TypeOptions {
            delay_ms: args.delay_ms,
        };
        call.page.type_text(&args.selector, &args.text, &opts).await?;
        Ok(None)
    }
}

// wait

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct WaitArgs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    selector: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    load: Option<WaitUntil>,
}

impl WaitArgs {
    fn target(&self) -> Option<WaitTarget> {
        if let Some(ref selector) = self.selector {
            Some(WaitTarget::Selector(selector.clone()))
        } else if let Some(ref text) = self.text {
            Some(WaitTarget::Text(text.clone()))
        } else {
            self.load.map(WaitTarget::Load)
        }
    }
}

pub struct Wait;

#[async_trait]
impl ActionHandler for Wait {
    fn kind(&self) -> &'static str {
        "wait"
    }

    fn usage(&self) -> &'static str {
        "<ms> | <selector> | exactly one of {selector} {text} {ms} {load}"
    }

    fn normalize(&self, raw: &Value) -> NormalizeResult {
        let args = match raw {
            Value::Number(n) => WaitArgs {
                ms: Some(n.as_u64().ok_or("wait duration must be a non-negative integer")?),
                ..Default::default()
            },
            Value::String(selector) => WaitArgs {
                selector: Some(selector.clone()),
                ..Default::default()
            },
            Value::Object(_) => from_object(raw)?,
            _ => return Err("expected milliseconds, a selector, or {selector|text|ms|load}".into()),
        };

        let set = [
            args.selector.is_some(),
            args.text.is_some(),
            args.ms.is_some(),
            args.load.is_some(),
        ]
        .iter()
        .filter(|b| **b)
        .count();
        if set != 1 {
            return Err(format!(
                "expected exactly one of selector, text, ms, load (got {})",
                set
            ));
        }
        canonical(&args)
    }

    fn target(&self, args: &Value) -> Option<String> {
        let args: WaitArgs = serde_json::from_value(args.clone()).ok()?;
        match args.ms {
            Some(ms) => Some(format!("{}ms", ms)),
            None => args.target().map(|t| t.describe()),
        }
    }

    async fn execute(&self, call: &StepCall<'_>, _ctx: &mut ExecutionContext) -> Result<Option<Value>> {
        let args: WaitArgs = decode(call)?;
        if let Some(ms) = args.ms {
            tokio::time::sleep(std::time::Duration::from_millis(ms)).await;
            return Ok(None);
        }
        let target = args
            .target()
            .ok_or_else(|| PilotError::Other("wait has no condition".into()))?;
        call.page.wait_for(&target, call.timeout).await?;
        Ok(None)
    }
}

// screenshot

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct ScreenshotArgs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    path: Option<String>,
    #[serde(default)]
    full_page: bool,
}

pub struct Screenshot;

#[async_trait]
impl ActionHandler for Screenshot {
    fn kind(&self) -> &'static str {
        "screenshot"
    }

    fn usage(&self) -> &'static str {
        "<path> | null | {path?, fullPage}"
    }

    fn normalize(&self, raw: &Value) -> NormalizeResult {
        let args = match raw {
            Value::Null => ScreenshotArgs::default(),
            Value::String(path) => ScreenshotArgs {
                path: Some(path.clone()),
                full_page: false,
            },
            Value::Object(_) => from_object(raw)?,
            _ => return Err("expected a path, null, or {path, fullPage}".into()),
        };
        canonical(&args)
    }

    fn target(&self, args: &Value) -> Option<String> {
        args.get("path").and_then(Value::as_str).map(str::to_string)
    }

    async fn execute(&self, call: &StepCall<'_>, _ctx: &mut ExecutionContext) -> Result<Option<Value>> {
        let args: ScreenshotArgs = decode(call)?;
        let saved = call
            .page
            .screenshot(&ScreenshotOptions {
                path: args.path,
                full_page: args.full_page,
            })
            .await?;
        Ok(Some(Value::String(saved)))
    }
}

// evaluate

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct EvaluateArgs {
    script: String,
}

pub struct Evaluate;

#[async_trait]
impl ActionHandler for Evaluate {
    fn kind(&self) -> &'static str {
        "evaluate"
    }

    fn usage(&self) -> &'static str {
        "<script> | {script}; the script's value is the step output"
    }

    fn normalize(&self, raw: &Value) -> NormalizeResult {
        let args = match raw {
            Value::String(script) => EvaluateArgs {
                script: script.clone(),
            },
            Value::Object(_) => from_object(raw)?,
            _ => return Err("expected a script string or {script}".into()),
        };
        canonical(&args)
    }

    fn extracts_data(&self) -> bool {
        true
    }

    async fn execute(&self, call: &StepCall<'_>, _ctx: &mut ExecutionContext) -> Result<Option<Value>> {
        let args: EvaluateArgs = decode(call)?;
        let value = call.page.evaluate(&args.script).await?;
        Ok(Some(value))
    }
}

// hover

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct SelectorArgs {
    selector: String,
}

pub struct Hover;

#[async_trait]
impl ActionHandler for Hover {
    fn kind(&self) -> &'static str {
        "hover"
    }

    fn usage(&self) -> &'static str {
        "<selector> | {selector}"
    }

    fn normalize(&self, raw: &Value) -> NormalizeResult {
        let args = match raw {
            Value::String(selector) => SelectorArgs {
                selector: selector.clone(),
            },
            Value::Object(_) => from_object(raw)?,
            _ => return Err("expected a selector string or {selector}".into()),
        };
        canonical(&args)
    }

    async fn execute(&self, call: &StepCall<'_>, _ctx: &mut ExecutionContext) -> Result<Option<Value>> {
        let args: SelectorArgs = decode(call)?;
        call.page.hover(&args.selector).await?;
        Ok(None)
    }
}

// select and fill

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct ValueArgs {
    selector: String,
    #[serde(alias = "text")]
    value: String,
}

pub struct Select;

#[async_trait]
impl ActionHandler for Select {
    fn kind(&self) -> &'static str {
        "select"
    }

    fn usage(&self) -> &'static str {
        "{selector, value}"
    }

    fn normalize(&self, raw: &Value) -> NormalizeResult {
        if !raw.is_object() {
            return Err("expected {selector, value}".into());
        }
        canonical(&from_object::<ValueArgs>(raw)?)
    }

    async fn execute(&self, call: &StepCall<'_>, _ctx: &mut ExecutionContext) -> Result<Option<Value>> {
        let args: ValueArgs = decode(call)?;
        call.page.select_option(&args.selector, &args.value).await?;
        Ok(None)
    }
}

pub struct Fill;

#[async_trait]
impl ActionHandler for Fill {
    fn kind(&self) -> &'static str {
        "fill"
    }

    fn usage(&self) -> &'static str {
        "{selector, value} (clears the field first)"
    }

    fn normalize(&self, raw: &Value) -> NormalizeResult {
        if !raw.is_object() {
            return Err("expected {selector, value}".into());
        }
        canonical(&from_object::<ValueArgs>(raw)?)
    }

    async fn execute(&self, call: &StepCall<'_>, _ctx: &mut ExecutionContext) -> Result<Option<Value>> {
        let args: ValueArgs = decode(call)?;
        call.page.fill(&args.selector, &args.value).await?;
        Ok(None)
    }
}

// scroll

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct ScrollArgs {
    #[serde(default)]
    direction: ScrollDirection,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pixels: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    selector: Option<String>,
}

pub struct Scroll;

#[async_trait]
impl ActionHandler for Scroll {
    fn kind(&self) -> &'static str {
        "scroll"
    }

    fn usage(&self) -> &'static str {
        "top|bottom|up|down | <pixels> | {direction, pixels?, selector?}"
    }

    fn normalize(&self, raw: &Value) -> NormalizeResult {
        let args = match raw {
            Value::String(direction) => ScrollArgs {
                direction: from_object(&Value::String(direction.to_lowercase()))
                    .map_err(|_| format!("unknown scroll direction '{}'", direction))?,
                ..Default::default()
            },
            Value::Number(n) => ScrollArgs {
                pixels: Some(
                    n.as_u64()
                        .and_then(|px| u32::try_from(px).ok())
                        .ok_or("scroll pixels must be a non-negative integer")?,
                ),
                ..Default::default()
            },
            Value::Object(_) => from_object(raw)?,
            _ => return Err("expected a direction, pixels, or {direction, pixels, selector}".into()),
        };
        canonical(&args)
    }

    async fn execute(&self, call: &StepCall<'_>, _ctx: &mut ExecutionContext) -> Result<Option<Value>> {
        let args: ScrollArgs = decode(call)?;
        call.page
            .scroll(&ScrollOptions {
                direction: args.direction,
                pixels: args.pixels,
                selector: args.selector,
            })
            .await?;
        Ok(None)
    }
}

// assert

pub struct Assert;

#[async_trait]
impl ActionHandler for Assert {
    fn kind(&self) -> &'static str {
        "assert"
    }

    fn usage(&self) -> &'static str {
        "<selector> | {selector?, exists, textContains?, urlContains?, titleContains?}"
    }

    fn normalize(&self, raw: &Value) -> NormalizeResult {
        let assertion = match raw {
            Value::String(selector) => Assertion {
                selector: Some(selector.clone()),
                exists: default_exists(),
                ..Default::default()
            },
            Value::Object(_) => from_object::<Assertion>(raw)?,
            _ => return Err("expected a selector or an assertion object".into()),
        };
        if assertion.selector.is_none()
            && assertion.url_contains.is_none()
            && assertion.title_contains.is_none()
        {
            return Err("assertion needs a selector, urlContains or titleContains".into());
        }
        if assertion.text_contains.is_some() && assertion.selector.is_none() {
            return Err("textContains requires a selector".into());
        }
        canonical(&assertion)
    }

    fn target(&self, args: &Value) -> Option<String> {
        ["selector", "urlContains", "titleContains"]
            .iter()
            .find_map(|key| args.get(*key).and_then(Value::as_str))
            .map(str::to_string)
    }

    async fn execute(&self, call: &StepCall<'_>, _ctx: &mut ExecutionContext) -> Result<Option<Value>> {
        let assertion: Assertion = decode(call)?;
        call.page.assert(&assertion).await?;
        Ok(None)
    }
}

// store

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct StoreArgs {
    key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    script: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    selector: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    attribute: Option<String>,
}

fn is_variable_name(key: &str) -> bool {
    let mut chars = key.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn read_element_script(selector: &str, attribute: Option<&str>) -> String {
    let read = match attribute {
        Some(attr) => format!("el.getAttribute({})", js_string(attr)),
        None => "(el.innerText || el.textContent || '').trim()".to_string(),
    };
    format!(
        "(() => {{ const el = document.querySelector({}); return el ? {} : null; }})()",
        js_string(selector),
        read
    )
}

pub struct Store;

#[async_trait]
impl ActionHandler for Store {
    fn kind(&self) -> &'static str {
        "store"
    }

    fn usage(&self) -> &'static str {
        "<key> (last output) | {key, value} | {key, script} | {key, selector, attribute?}"
    }

    fn normalize(&self, raw: &Value) -> NormalizeResult {
        let args = match raw {
            Value::String(key) => StoreArgs {
                key: key.clone(),
                ..Default::default()
            },
            Value::Object(_) => from_object::<StoreArgs>(raw)?,
            _ => return Err("expected a key or {key, value|script|selector}".into()),
        };
        if !is_variable_name(&args.key) {
            return Err(format!("'{}' is not a valid variable name", args.key));
        }
        let sources = [
            args.value.is_some(),
            args.script.is_some(),
            args.selector.is_some(),
        ]
        .iter()
        .filter(|b| **b)
        .count();
        if sources > 1 {
            return Err("use only one of value, script, selector".into());
        }
        if args.attribute.is_some() && args.selector.is_none() {
            return Err("attribute requires a selector".into());
        }
        canonical(&args)
    }

    fn extracts_data(&self) -> bool {
        true
    }

    async fn execute(&self, call: &StepCall<'_>, ctx: &mut ExecutionContext) -> Result<Option<Value>> {
        let args: StoreArgs = decode(call)?;

        let value = if let Some(value) = args.value {
            value
        } else if let Some(ref script) = args.script {
            call.page.evaluate(script).await?
        } else if let Some(ref selector) = args.selector {
            let value = call
                .page
                .evaluate(&read_element_script(selector, args.attribute.as_deref()))
                .await?;
            if value.is_null() {
                return Err(PilotError::Other(format!(
                    "no element matches '{}'",
                    selector
                )));
            }
            value
        } else {
            ctx.last_output().cloned().ok_or_else(|| {
                PilotError::Other("nothing to store: no previous step returned a value".into())
            })?
        };

        ctx.store_value(&args.key, &value);
        Ok(Some(value))
    }
}
