//! Interactive decisions for the feedback loop
//!
//! Reads the user's choice between rounds from stdin.

use std::io::{self, Write};

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::Mutex;

use crate::agent::{AcceptChoice, Attempt, FeedbackDecider, RetryChoice};

/// Map a line typed after a failed round to a choice.
///
/// A number picks a verifier suggestion (1-based), `r` retries, `a` or `q`
/// abandons and anything else is guidance for the next round. End of input
/// abandons.
pub fn parse_retry_choice(line: Option<&str>, suggestions: usize) -> RetryChoice {
    let Some(line) = line.map(str::trim) else {
        return RetryChoice::Abandon;
    };
    match line.to_lowercase().as_str() {
        "" | "r" | "retry" => RetryChoice::Retry,
        "a" | "abandon" | "q" | "quit" => RetryChoice::Abandon,
        other => match other.parse::<usize>() {
            Ok(n) if n >= 1 && n <= suggestions => RetryChoice::Suggestion(n - 1),
            _ => RetryChoice::Feedback(line.to_string()),
        },
    }
}

/// Map a line typed after an accepted round; empty input or end of input finishes
pub fn parse_accept_choice(line: Option<&str>) -> AcceptChoice {
    match line.map(str::trim) {
        None | Some("") => AcceptChoice::Finish,
        Some(line) if matches!(line.to_lowercase().as_str(), "done" | "finish" | "y" | "yes") => {
            AcceptChoice::Finish
        }
        Some(line) => AcceptChoice::Extend(line.to_string()),
    }
}

/// Decider that asks on the terminal
pub struct StdinDecider {
    lines: Mutex<Lines<BufReader<Stdin>>>,
}

impl StdinDecider {
    pub fn new() -> Self {
        Self {
            lines: Mutex::new(BufReader::new(tokio::io::stdin()).lines()),
        }
    }

    async fn ask(&self, prompt: &str) -> Option<String> {
        print!("{}", prompt);
        let _ = io::stdout().flush();
        match self.lines.lock().await.next_line().await {
            Ok(line) => line,
            Err(e) => {
                eprintln!("Error reading input: {}", e);
                None
            }
        }
    }
}

impl Default for StdinDecider {
    fn default() -> Self {
        Self::new()
    }
}

fn print_round(attempt: &Attempt) {
    let verdict = attempt
        .verdict
        .map(|v| v.to_string())
        .unwrap_or_else(|| "not verified".to_string());
    println!("\n[Round {}] {}", attempt.round, verdict);
    if let Some(ref result) = attempt.execution_result {
        println!("{}", result.summary());
    }
    if let Some(ref verification) = attempt.verification {
        if !verification.analysis.is_empty() {
            println!("Analysis: {}", verification.analysis);
        }
        if !verification.reason.is_empty() {
            println!("Reason:   {}", verification.reason);
        }
    }
}

#[async_trait]
impl FeedbackDecider for StdinDecider {
    async fn after_failure(&self, attempt: &Attempt) -> RetryChoice {
        print_round(attempt);
        let suggestions = attempt.suggestions();
        if !suggestions.is_empty() {
            println!("Suggestions:");
            for (i, suggestion) in suggestions.iter().enumerate() {
                println!("  {}. {}", i + 1, suggestion);
            }
        }
        let line = self
            .ask("\nPick a suggestion, [r]etry, [a]bandon, or type guidance: ")
            .await;
        parse_retry_choice(line.as_deref(), suggestions.len())
    }

    async fn after_success(&self, attempt: &Attempt, document: &str) -> AcceptChoice {
        print_round(attempt);
        println!("\nAccepted workflow:\n{}", document.trim_end());
        let line = self
            .ask("\nPress Enter to finish, or describe what to do next: ")
            .await;
        parse_accept_choice(line.as_deref())
    }

    async fn confirm_unverified(&self, attempt: &Attempt) -> bool {
        print_round(attempt);
        let line = self
            .ask("\nThe verifier gave no verdict. Accept this round? [y/N]: ")
            .await;
        matches!(
            line.as_deref().map(|l| l.trim().to_lowercase()).as_deref(),
            Some("y") | Some("yes")
        )
    }
}
