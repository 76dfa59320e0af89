//! Pilot - intent-driven browser automation
//!
//! Main entry point for the CLI application.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use pilot::cli::{self, DocumentSource};
use pilot::Config;
use tracing_subscriber::EnvFilter;

/// Pilot - turn intents into verified browser workflows
#[derive(Parser, Debug)]
#[command(name = "pilot")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Enable debug output
    #[arg(long, short = 'd', global = true)]
    debug: bool,

    /// Run in headed browser mode (visible window)
    #[arg(long, global = true)]
    headed: bool,

    /// Model that writes step documents
    #[arg(long, short = 'g', global = true)]
    generator: Option<String>,

    /// Model that judges runs
    #[arg(long, short = 'v', global = true)]
    verifier: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Execute a step document once
    Run {
        /// Step document (YAML or JSON)
        #[arg(required_unless_present = "workflow")]
        file: Option<PathBuf>,

        /// Run a saved workflow by name or id instead of a file
        #[arg(long, short = 'w', conflicts_with = "file")]
        workflow: Option<String>,

        /// Keep going after a failed step
        #[arg(long)]
        continue_on_error: bool,

        /// Initial variable, KEY=VALUE (repeatable)
        #[arg(long = "var", value_name = "KEY=VALUE")]
        vars: Vec<String>,
    },

    /// Generate, run and refine steps for an intent until accepted
    Loop {
        /// What the workflow should do
        intent: String,

        /// Save the accepted workflow under this name
        #[arg(long, short = 's')]
        save: Option<String>,

        /// Maximum rounds per intent
        #[arg(long)]
        max_attempts: Option<usize>,

        /// Initial variable, KEY=VALUE (repeatable)
        #[arg(long = "var", value_name = "KEY=VALUE")]
        vars: Vec<String>,
    },

    /// List recorded runs, or show one
    Runs {
        /// Run id to show in full
        id: Option<String>,
    },

    /// List saved workflows
    Workflows,
}

fn init_tracing(debug: bool) {
    let default = if debug { "pilot=debug" } else { "pilot=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();

    // Build configuration
    let mut config = Config::load();

    // Apply CLI overrides
    if args.debug {
        config.debug = true;
    }

    if args.headed {
        config.browser.headed = true;
    }

    if let Some(ref generator) = args.generator {
        config.models.generator = generator.clone();
    }

    if let Some(ref verifier) = args.verifier {
        config.models.verifier = verifier.clone();
    }

    init_tracing(config.debug);

    let ok = match args.command {
        Command::Run {
            file,
            workflow,
            continue_on_error,
            vars,
        } => {
            let vars = cli::parse_vars(&vars)?;
            let source = match (file.as_deref(), workflow.as_deref()) {
                (_, Some(name)) => DocumentSource::Saved(name),
                (Some(path), None) => DocumentSource::File(path),
                (None, None) => anyhow::bail!("give a step document or --workflow"),
            };
            cli::run_document(&config, source, continue_on_error, vars).await?
        }
        Command::Loop {
            intent,
            save,
            max_attempts,
            vars,
        } => {
            if let Some(max_attempts) = max_attempts {
                config.feedback.max_attempts = max_attempts;
            }
            let vars = cli::parse_vars(&vars)?;
            cli::run_loop(&config, &intent, save.as_deref(), vars).await?
        }
        Command::Runs { id } => {
            cli::show_runs(&config, id.as_deref()).await?;
            true
        }
        Command::Workflows => {
            cli::show_workflows(&config).await?;
            true
        }
    };

    Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}
