//! CLI commands
//!
//! One function per subcommand. Each wires the library pieces together from
//! the loaded `Config` and prints results for the terminal.

use std::collections::HashMap;
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;

use tracing::info;

use crate::actions::ActionRegistry;
use crate::agent::{
    AbandonReason, FeedbackLoop, LoopOutcome, GENERATOR_SYSTEM_PROMPT, VERIFIER_SYSTEM_PROMPT,
};
use crate::browser::{AgentBrowser, BrowserCapability};
use crate::cli::interactive::StdinDecider;
use crate::core::{Config, PilotError, Result, WorkflowExecutionResult};
use crate::executor::{ActionExecutor, ExecutionContext, FailurePolicy};
use crate::llm::{LLMProvider, LlmOracle, OllamaClient, Oracle};
use crate::steps::StepParser;
use crate::storage::{FileWorkflowStore, RunContext, RunLog, WorkflowStore};

/// Where `run` reads its step document from
pub enum DocumentSource<'a> {
    File(&'a Path),
    Saved(&'a str),
}

/// Parse repeated `KEY=VALUE` flags into initial variables
pub fn parse_vars(pairs: &[String]) -> Result<HashMap<String, String>> {
    pairs
        .iter()
        .map(|pair| match pair.split_once('=') {
            Some((key, value)) if !key.trim().is_empty() => {
                Ok((key.trim().to_string(), value.to_string()))
            }
            _ => Err(PilotError::config(format!(
                "invalid variable '{}', expected KEY=VALUE",
                pair
            ))),
        })
        .collect()
}

async fn connect_browser(config: &Config) -> Result<Arc<AgentBrowser>> {
    let browser = AgentBrowser::from_config(&config.browser);
    if !browser.is_available().await {
        return Err(PilotError::AgentBrowserNotFound);
    }
    Ok(Arc::new(browser))
}

async fn open_run_log(config: &Config) -> Result<RunLog> {
    let log = RunLog::new(&config.storage.run_log_dir);
    log.init().await?;
    Ok(log)
}

async fn write_run_log(
    log: &RunLog,
    page: &dyn BrowserCapability,
    result: &WorkflowExecutionResult,
) -> String {
    let url = page.current_url().await.unwrap_or_default();
    log.create_run_log(result, RunContext::new(url))
        .await
        .id()
        .to_string()
}

/// Execute a step document once. Returns whether every step succeeded.
pub async fn run_document(
    config: &Config,
    source: DocumentSource<'_>,
    continue_on_error: bool,
    variables: HashMap<String, String>,
) -> Result<bool> {
    let document = match source {
        DocumentSource::File(path) => tokio::fs::read_to_string(path).await?,
        DocumentSource::Saved(name) => {
            let store = FileWorkflowStore::new(&config.storage.workflow_dir);
            store.load(name).await?.document
        }
    };

    let registry = Arc::new(ActionRegistry::with_defaults());
    let parsed = StepParser::new(&registry).parse_str(&document)?;
    for warning in &parsed.warnings {
        println!("warning: {}", warning);
    }

    let browser = connect_browser(config).await?;
    let log = open_run_log(config).await?;

    let policy = if continue_on_error {
        FailurePolicy::ContinueOnError
    } else {
        FailurePolicy::from_strict(config.executor.strict)
    };
    let executor = ActionExecutor::from_config(registry, browser.clone(), config).with_policy(policy);
    let mut ctx = ExecutionContext::with_variables(variables);

    let result = match executor.execute(&parsed.actions, &mut ctx).await {
        Ok(result) => result,
        Err(PilotError::ActionFailure { failure, partial }) => {
            let id = write_run_log(&log, browser.as_ref(), &partial).await;
            println!("{}", partial.summary());
            println!("\nAborted: {}\nRun log: {}", failure, id);
            return Ok(false);
        }
        Err(e) => return Err(e),
    };

    let id = write_run_log(&log, browser.as_ref(), &result).await;
    println!("{}", result.summary());
    if !ctx.variables().is_empty() {
        println!("\nVariables:");
        let mut names: Vec<_> = ctx.variables().iter().collect();
        names.sort();
        for (name, value) in names {
            println!("  {} = {}", name, value);
        }
    }
    println!("\nRun log: {}", id);

    Ok(result.all_succeeded())
}

async fn oracle(
    provider: &Arc<OllamaClient>,
    model: &str,
    system_prompt: &str,
    stream: bool,
) -> Result<Arc<dyn Oracle>> {
    if !provider.is_model_available(model).await? {
        return Err(PilotError::ModelNotFound(model.to_string()));
    }
    let mut oracle = LlmOracle::new(provider.clone(), model).with_system_prompt(system_prompt);
    if stream {
        oracle = oracle.with_stream(Box::new(|token: &str| {
            print!("{}", token);
            let _ = io::stdout().flush();
        }));
    }
    Ok(Arc::new(oracle))
}

/// Run the feedback loop for an intent. Returns whether a workflow was accepted.
pub async fn run_loop(
    config: &Config,
    intent: &str,
    save_as: Option<&str>,
    variables: HashMap<String, String>,
) -> Result<bool> {
    let provider = Arc::new(OllamaClient::from_config(config)?);
    let generator = oracle(
        &provider,
        &config.models.generator,
        GENERATOR_SYSTEM_PROMPT,
        config.streaming.enabled,
    )
    .await?;
    let verifier = oracle(&provider, &config.models.verifier, VERIFIER_SYSTEM_PROMPT, false).await?;

    let browser = connect_browser(config).await?;
    let feedback = FeedbackLoop::new(generator, verifier, browser, config)
        .with_run_log(open_run_log(config).await?)
        .with_variables(variables);

    let report = feedback.run(intent, &StdinDecider::new()).await?;
    info!(rounds = report.rounds(), runs = report.run_ids.len(), "loop finished");

    match report.outcome {
        LoopOutcome::Accepted { ref document, .. } => {
            println!("\nWorkflow accepted after {} round(s).", report.rounds());
            if let Some(name) = save_as {
                let store = FileWorkflowStore::new(&config.storage.workflow_dir);
                let saved = store.save(name, intent, document, None, &[]).await?;
                println!("Saved as '{}' ({})", saved.name, saved.id);
            } else {
                println!("\n{}", document.trim_end());
            }
            Ok(true)
        }
        LoopOutcome::Abandoned(AbandonReason::AttemptCap { attempts }) => {
            println!("\nGave up after {} attempt(s).", attempts);
            Ok(false)
        }
        LoopOutcome::Abandoned(AbandonReason::UserRequested) => {
            println!("\nAbandoned.");
            Ok(false)
        }
    }
}

/// List run log entries, or show one in full
pub async fn show_runs(config: &Config, id: Option<&str>) -> Result<()> {
    let log = RunLog::new(&config.storage.run_log_dir);

    if let Some(id) = id {
        let entry = log.load(id).await?;
        println!("{}", serde_json::to_string_pretty(&entry)?);
        return Ok(());
    }

    let entries = log.list().await?;
    if entries.is_empty() {
        println!("No runs recorded in {}", log.dir().display());
        return Ok(());
    }
    for entry in entries {
        let result = entry.execution_result();
        println!(
            "{}  {}  {}/{} ok  {}",
            entry.id(),
            entry.timestamp().format("%Y-%m-%d %H:%M:%S"),
            result.successful_steps,
            result.total_steps,
            entry.url()
        );
    }
    Ok(())
}

/// List saved workflows
pub async fn show_workflows(config: &Config) -> Result<()> {
    let store = FileWorkflowStore::new(&config.storage.workflow_dir);
    let workflows = store.list().await?;
    if workflows.is_empty() {
        println!("No saved workflows.");
        return Ok(());
    }
    for workflow in workflows {
        println!(
            "{}  {}  {}",
            workflow.name,
            workflow.created_at.format("%Y-%m-%d %H:%M"),
            workflow.intent
        );
        if let Some(ref description) = workflow.description {
            println!("    {}", description);
        }
    }
    Ok(())
}
