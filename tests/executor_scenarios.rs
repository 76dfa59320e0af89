//! Executor integration tests
//!
//! Runs parsed step documents against the in-memory browser.

mod common;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use common::{FakeBrowser, FakePage};
use pilot::actions::ActionRegistry;
use pilot::core::StepFailure;
use pilot::executor::{ActionExecutor, ExecutionContext, FailurePolicy};
use pilot::steps::{Action, StepParser};
use pilot::PilotError;
use tokio_test::{assert_err, assert_ok};

const MISSING_CLICK: &str = r##"
- navigate: "https://x.test"
- click: "#missing"
"##;

fn parse(document: &str) -> Vec<Action> {
    let registry = ActionRegistry::with_defaults();
    StepParser::new(&registry).parse_str(document).unwrap().actions
}

fn executor(browser: Arc<FakeBrowser>) -> ActionExecutor {
    ActionExecutor::new(Arc::new(ActionRegistry::with_defaults()), browser)
}

#[tokio::test]
async fn test_strict_run_aborts_at_failing_step() {
    let browser = Arc::new(FakeBrowser::new().with_page("https://x.test", FakePage::new("X")));
    let actions = parse(MISSING_CLICK);

    let err = assert_err!(
        executor(browser.clone())
            .execute(&actions, &mut ExecutionContext::new())
            .await
    );

    assert_eq!(err.failed_step(), Some(2));
    let message = err.to_string();
    assert!(message.contains("#missing"), "{}", message);
    assert!(message.contains("step 2"), "{}", message);

    match err {
        PilotError::ActionFailure { failure, partial } => {
            assert!(matches!(failure, StepFailure::Action { step: 2, .. }));
            assert_eq!(partial.total_steps, 2);
            assert_eq!(partial.successful_steps, 1);
            assert_eq!(partial.failed_steps, 1);
        }
        other => panic!("expected an action failure, got {:?}", other),
    }
    assert_eq!(browser.calls(), vec!["navigate https://x.test"]);
}

#[tokio::test]
async fn test_continue_on_error_completes_run() {
    let browser = Arc::new(FakeBrowser::new().with_page("https://x.test", FakePage::new("X")));
    let actions = parse(MISSING_CLICK);

    let result = assert_ok!(
        executor(browser)
            .with_policy(FailurePolicy::ContinueOnError)
            .execute(&actions, &mut ExecutionContext::new())
            .await
    );

    assert_eq!(result.total_steps, 2);
    assert_eq!(result.successful_steps, 1);
    assert_eq!(result.failed_steps, 1);
    assert!(result.steps[1]
        .error
        .as_deref()
        .unwrap_or_default()
        .contains("#missing"));
}

#[tokio::test]
async fn test_step_numbers_follow_document_order() {
    let page = FakePage::new("Shop")
        .element("#search", &[""])
        .element(".result", &["a", "b"]);
    let browser = Arc::new(FakeBrowser::new().with_page("https://shop.test", page));
    let actions = parse(
        r##"
- navigate: "https://shop.test"
- click: "#nope"
- type: {selector: "#search", text: "lamp"}
- hover: "#gone"
- click: ".result"
- screenshot: {}
"##,
    );

    let result = executor(browser)
        .with_policy(FailurePolicy::ContinueOnError)
        .execute(&actions, &mut ExecutionContext::new())
        .await
        .unwrap();

    let numbers: Vec<usize> = result.steps.iter().map(|s| s.step_number).collect();
    assert_eq!(numbers, vec![1, 2, 3, 4, 5, 6]);
    assert_eq!(result.total_steps, result.successful_steps + result.failed_steps);
    assert_eq!(result.failed_steps, 2);
    let kinds: Vec<&str> = result.steps.iter().map(|s| s.kind.as_str()).collect();
    assert_eq!(kinds, vec!["navigate", "click", "type", "hover", "click", "screenshot"]);
}

#[tokio::test]
async fn test_wait_expiry_is_a_timeout_naming_the_selector() {
    let browser = Arc::new(FakeBrowser::new().with_page("https://x.test", FakePage::new("X")));
    let actions = parse(
        r#"
- navigate: "https://x.test"
- wait: ".never"
"#,
    );

    let err = executor(browser)
        .with_timeout(Duration::from_millis(50))
        .execute(&actions, &mut ExecutionContext::new())
        .await
        .unwrap_err();

    match err {
        PilotError::ActionFailure { failure, .. } => {
            assert!(failure.is_timeout());
            assert_eq!(
                failure,
                StepFailure::Timeout {
                    step: 2,
                    kind: "wait".into(),
                    target: Some(".never".into()),
                    timeout_ms: 50,
                }
            );
        }
        other => panic!("expected a timeout, got {:?}", other),
    }
}

#[tokio::test]
async fn test_per_step_timeout_overrides_default() {
    let browser = Arc::new(FakeBrowser::new().with_page("https://x.test", FakePage::new("X")));
    let actions = parse(
        r#"
- navigate: "https://x.test"
- wait: {selector: ".late", timeout: 20}
"#,
    );

    let result = executor(browser)
        .with_policy(FailurePolicy::ContinueOnError)
        .with_timeout(Duration::from_secs(30))
        .execute(&actions, &mut ExecutionContext::new())
        .await
        .unwrap();

    let error = result.steps[1].error.clone().unwrap_or_default();
    assert!(error.contains("timed out after 20ms"), "{}", error);
}

#[tokio::test]
async fn test_fixed_wait_timeout_names_the_duration() {
    let browser = Arc::new(FakeBrowser::new().with_page("https://x.test", FakePage::new("X")));
    let actions = parse(
        r#"
- navigate: "https://x.test"
- wait: {ms: 200, timeout: 20}
"#,
    );

    let err = executor(browser)
        .execute(&actions, &mut ExecutionContext::new())
        .await
        .unwrap_err();

    match err {
        PilotError::ActionFailure { failure, .. } => assert_eq!(
            failure,
            StepFailure::Timeout {
                step: 2,
                kind: "wait".into(),
                target: Some("200ms".into()),
                timeout_ms: 20,
            }
        ),
        other => panic!("expected a timeout, got {:?}", other),
    }
}

#[tokio::test]
async fn test_stored_values_feed_later_steps() {
    let page = FakePage::new("Profile")
        .element("#search", &[""])
        .script(r#"querySelector("h1")"#, json!("Ada Lovelace"));
    let browser = Arc::new(FakeBrowser::new().with_page("https://x.test/me", page));
    let actions = parse(
        r##"
- navigate: "${BASE}/me"
- store: {key: NAME, selector: "h1"}
- type: {selector: "#search", text: "${NAME} ${UNSET}"}
"##,
    );

    let mut ctx = ExecutionContext::with_variables(HashMap::from([(
        "BASE".to_string(),
        "https://x.test".to_string(),
    )]));
    let result = executor(browser.clone())
        .execute(&actions, &mut ctx)
        .await
        .unwrap();

    assert!(result.all_succeeded());
    assert_eq!(ctx.get("NAME"), Some("Ada Lovelace"));
    assert!(browser
        .calls()
        .contains(&"type #search Ada Lovelace ${UNSET}".to_string()));
}

#[tokio::test]
async fn test_evaluate_output_becomes_last_output() {
    let page = FakePage::new("List").script("titles", json!(["a", "b", "c"]));
    let browser = Arc::new(FakeBrowser::new().with_page("https://x.test", page));
    let actions = parse(
        r#"
- navigate: "https://x.test"
- evaluate: "window.titles"
- store: COUNTED
"#,
    );

    let mut ctx = ExecutionContext::new();
    let result = executor(browser).execute(&actions, &mut ctx).await.unwrap();

    assert_eq!(result.steps[1].output.as_deref(), Some(r#"3 items: ["a","b","c"]"#));
    assert_eq!(result.steps[1].data, Some(json!(["a", "b", "c"])));
    assert_eq!(ctx.get("COUNTED"), Some(r#"["a","b","c"]"#));
}

#[tokio::test]
async fn test_unregistered_kind_is_fatal_even_when_continuing() {
    let browser = Arc::new(FakeBrowser::new());
    let actions = vec![
        Action::new("navigate", json!({"url": "https://x.test"}), 1),
        Action::new("teleport", json!({}), 2),
    ];

    let err = executor(browser)
        .with_policy(FailurePolicy::ContinueOnError)
        .execute(&actions, &mut ExecutionContext::new())
        .await
        .unwrap_err();

    assert!(matches!(err, PilotError::UnknownCommand { ref kind, step: 2 } if kind == "teleport"));
}
