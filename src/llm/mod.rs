//! LLM module - Language Model integrations
//!
//! Provides the provider abstraction, the Ollama client, and the oracle
//! adapter consumed by the feedback loop.

pub mod ollama;
pub mod oracle;
pub mod traits;

pub use ollama::OllamaClient;
pub use oracle::{LlmOracle, Oracle};
pub use traits::{GenerateOptions, LLMProvider, LLMResponse, Message, StreamCallback, TokenUsage};
