//! Configuration management for Pilot
//!
//! Supports environment variables, config files, and runtime overrides.
//!
//! Config file location: ~/.config/pilot/config.toml

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::core::error::{PilotError, Result};

/// Main configuration for Pilot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Verbose logging
    #[serde(default = "default_debug")]
    pub debug: bool,
    /// Ollama configuration
    #[serde(default)]
    pub ollama: OllamaConfig,
    /// Model configuration
    #[serde(default)]
    pub models: ModelConfig,
    /// Browser configuration
    #[serde(default)]
    pub browser: BrowserConfig,
    /// Step execution policy
    #[serde(default)]
    pub executor: ExecutorConfig,
    /// Feedback loop limits
    #[serde(default)]
    pub feedback: FeedbackConfig,
    /// DOM digest bounds
    #[serde(default)]
    pub digest: DigestConfig,
    /// Selector ranking bounds
    #[serde(default)]
    pub ranker: RankerConfig,
    /// Run log and workflow locations
    #[serde(default)]
    pub storage: StorageConfig,
    /// Streaming configuration
    #[serde(default)]
    pub streaming: StreamingConfig,
}

/// Ollama server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaConfig {
    /// Host address (default: localhost)
    pub host: String,
    /// Port number (default: 11434)
    pub port: u16,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

/// Model configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Model that writes step documents
    pub generator: String,
    /// Model that judges whether a run satisfied the intent
    pub verifier: String,
}

/// Browser automation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    /// agent-browser executable
    pub binary: String,
    /// Session name for agent-browser
    pub session_name: String,
    /// Whether to run in headed mode (visible browser)
    pub headed: bool,
    /// Default timeout for a single action in ms
    pub timeout_ms: u64,
}

/// Executor policy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Abort on the first failing step
    pub strict: bool,
    /// Maximum characters kept from a step's return value
    pub output_limit: usize,
}

/// What to do when the verification oracle cannot give a verdict
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationFallback {
    /// Treat the round as verified
    #[default]
    AssumeSuccess,
    /// Report an UNKNOWN verdict and let the user decide
    AskUser,
}

/// Feedback loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackConfig {
    /// Rounds allowed per intent before the loop abandons
    pub max_attempts: usize,
    /// Upper bound on a single oracle call
    pub oracle_timeout_secs: u64,
    /// Behaviour when verification errors
    #[serde(default)]
    pub verification_fallback: VerificationFallback,
}

/// DOM digest configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DigestConfig {
    /// Elements sampled from the page per collection
    pub max_elements: usize,
    /// Element patterns kept, by descending count
    pub top_patterns: usize,
    /// Text samples kept
    pub max_texts: usize,
    /// Characters kept per text sample
    pub max_text_len: usize,
    /// Upper bound on the serialized digest
    pub byte_budget: usize,
}

/// Selector ranker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankerConfig {
    /// Candidates counted against the live page
    pub max_candidates: usize,
    /// Matched texts fetched per candidate
    pub sample_limit: usize,
}

/// Storage locations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding one JSON file per run log entry
    pub run_log_dir: PathBuf,
    /// Directory holding saved workflows
    pub workflow_dir: PathBuf,
}

/// Streaming configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamingConfig {
    /// Whether to stream generation output in real-time
    pub enabled: bool,
}

fn env_flag(name: &str, default: bool) -> bool {
    env::var(name)
        .map(|v| v == "true" || v == "1")
        .unwrap_or(default)
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn default_debug() -> bool {
    env_flag("PILOT_DEBUG", false)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            debug: default_debug(),
            ollama: OllamaConfig::default(),
            models: ModelConfig::default(),
            browser: BrowserConfig::default(),
            executor: ExecutorConfig::default(),
            feedback: FeedbackConfig::default(),
            digest: DigestConfig::default(),
            ranker: RankerConfig::default(),
            storage: StorageConfig::default(),
            streaming: StreamingConfig::default(),
        }
    }
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            host: env::var("OLLAMA_HOST").unwrap_or_else(|_| "localhost".to_string()),
            port: env_parse("OLLAMA_PORT", 11434),
            timeout_secs: 120,
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            generator: env::var("PILOT_GENERATOR_MODEL").unwrap_or_else(|_| "qwen3:8b".to_string()),
            verifier: env::var("PILOT_VERIFIER_MODEL").unwrap_or_else(|_| "qwen3:8b".to_string()),
        }
    }
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            binary: env::var("PILOT_BROWSER_BIN").unwrap_or_else(|_| "agent-browser".to_string()),
            session_name: env::var("PILOT_BROWSER_SESSION").unwrap_or_else(|_| "pilot".to_string()),
            headed: env_flag("PILOT_BROWSER_HEADED", false),
            timeout_ms: env_parse("PILOT_ACTION_TIMEOUT_MS", 30_000),
        }
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            strict: env_flag("PILOT_STRICT", true),
            output_limit: 500,
        }
    }
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            max_attempts: env_parse("PILOT_MAX_ATTEMPTS", 5),
            oracle_timeout_secs: 120,
            verification_fallback: VerificationFallback::default(),
        }
    }
}

impl Default for DigestConfig {
    fn default() -> Self {
        Self {
            max_elements: 400,
            top_patterns: 15,
            max_texts: 12,
            max_text_len: 80,
            byte_budget: 4_000,
        }
    }
}

impl Default for RankerConfig {
    fn default() -> Self {
        Self {
            max_candidates: 10,
            sample_limit: 20,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let data_dir = Config::data_dir();
        Self {
            run_log_dir: data_dir.join("runs"),
            workflow_dir: data_dir.join("workflows"),
        }
    }
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            enabled: env_flag("PILOT_STREAMING", true),
        }
    }
}

impl Config {
    /// Get the config directory path
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("pilot")
    }

    /// Get the data directory path (run logs, saved workflows)
    pub fn data_dir() -> PathBuf {
        env::var("PILOT_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                dirs::data_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join("pilot")
            })
    }

    /// Get the config file path
    pub fn config_file() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Load configuration from file, environment, and defaults
    /// Priority: CLI args > env vars > config file > defaults
    pub fn load() -> Self {
        let _ = dotenvy::dotenv();

        if let Ok(config) = Self::load_from_file() {
            return config;
        }

        Self::default()
    }

    /// Load configuration from file only
    pub fn load_from_file() -> Result<Self> {
        let config_path = Self::config_file();

        if !config_path.exists() {
            return Err(PilotError::config("Config file not found"));
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|e| PilotError::config(format!("Failed to read config: {}", e)))?;

        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text; missing sections take defaults
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| PilotError::config(format!("Failed to parse config: {}", e)))
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<PathBuf> {
        let config_dir = Self::config_dir();
        let config_path = Self::config_file();

        if !config_dir.exists() {
            fs::create_dir_all(&config_dir)
                .map_err(|e| PilotError::config(format!("Failed to create config dir: {}", e)))?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| PilotError::config(format!("Failed to serialize config: {}", e)))?;

        fs::write(&config_path, content)
            .map_err(|e| PilotError::config(format!("Failed to write config: {}", e)))?;

        Ok(config_path)
    }

    /// Get the full Ollama API URL
    pub fn ollama_url(&self) -> String {
        format!("http://{}:{}", self.ollama.host, self.ollama.port)
    }

    /// Per-action timeout
    pub fn action_timeout(&self) -> Duration {
        Duration::from_millis(self.browser.timeout_ms)
    }

    /// Per-oracle-call timeout
    pub fn oracle_timeout(&self) -> Duration {
        Duration::from_secs(self.feedback.oracle_timeout_secs)
    }

    /// Generate a default config file content for display
    pub fn default_config_toml() -> String {
        toml::to_string_pretty(&Config::default())
            .unwrap_or_else(|_| String::from("# Error generating config"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.ollama.timeout_secs, 120);
        assert_eq!(config.digest.top_patterns, 15);
        assert_eq!(config.ranker.max_candidates, 10);
        assert_eq!(
            config.feedback.verification_fallback,
            VerificationFallback::AssumeSuccess
        );
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = Config::from_toml(
            r#"
            [feedback]
            max_attempts = 2
            oracle_timeout_secs = 10
            verification_fallback = "ask_user"
            "#,
        )
        .unwrap();
        assert_eq!(config.feedback.max_attempts, 2);
        assert_eq!(config.feedback.verification_fallback, VerificationFallback::AskUser);
        assert_eq!(config.digest.max_texts, 12);
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = Config::from_toml("feedback = 3 = 4").unwrap_err();
        assert!(matches!(err, PilotError::Config(_)));
    }

    #[test]
    fn test_config_serialization() {
        let toml_str = Config::default_config_toml();
        assert!(toml_str.contains("generator"));
        assert!(toml_str.contains("byte_budget"));
    }

    #[test]
    fn test_config_dir() {
        let dir = Config::config_dir();
        assert!(dir.to_string_lossy().contains("pilot"));
    }
}
