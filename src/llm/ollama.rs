//! Ollama client implementation
//!
//! Async HTTP client for the Ollama chat API with streaming support.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::core::{Config, PilotError, Result};
use crate::llm::traits::{
    GenerateOptions, LLMProvider, LLMResponse, Message, StreamCallback, TokenUsage,
};

/// Ollama API client
#[derive(Clone)]
pub struct OllamaClient {
    client: Client,
    base_url: String,
}

/// Ollama chat request
#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<OllamaOptions>,
    stream: bool,
}

/// Ollama generation options
#[derive(Debug, Serialize)]
struct OllamaOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<Vec<String>>,
}

impl From<GenerateOptions> for OllamaOptions {
    fn from(opts: GenerateOptions) -> Self {
        Self {
            temperature: opts.temperature,
            num_predict: opts.max_tokens,
            stop: opts.stop,
        }
    }
}

/// Ollama chat response (non-streaming)
#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: ResponseMessage,
    model: String,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
}

/// Message in a chat response or stream chunk
#[derive(Debug, Default, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: String,
}

/// Ollama streaming chunk response
#[derive(Debug, Deserialize)]
struct StreamChunkResponse {
    #[serde(default)]
    message: Option<ResponseMessage>,
    model: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
}

/// Ollama models list response
#[derive(Debug, Deserialize)]
struct ModelsResponse {
    models: Vec<ModelInfo>,
}

/// Model information
#[derive(Debug, Deserialize)]
struct ModelInfo {
    name: String,
}

fn token_usage(prompt: Option<u32>, completion: Option<u32>) -> Option<TokenUsage> {
    match (prompt, completion) {
        (Some(prompt), Some(completion)) => Some(TokenUsage {
            prompt_tokens: prompt,
            completion_tokens: completion,
            total_tokens: prompt + completion,
        }),
        _ => None,
    }
}

impl OllamaClient {
    /// Create a new Ollama client from configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.ollama.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.ollama_url(),
        })
    }

    /// Create a client with custom base URL
    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    /// Base URL this client talks to
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn connect_error(&self, e: reqwest::Error) -> PilotError {
        if e.is_connect() {
            PilotError::ollama(format!(
                "Cannot connect to Ollama at {}. Is it running?",
                self.base_url
            ))
        } else {
            PilotError::from(e)
        }
    }

    /// POST a chat request and map non-success statuses to errors
    async fn post_chat(&self, model: &str, request: &ChatRequest<'_>) -> Result<Response> {
        let request_json = serde_json::to_string(request)?;
        debug!(target: "pilot::llm", len = request_json.len(), "ollama chat request");

        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(request)
            .send()
            .await
            .map_err(|e| self.connect_error(e))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();

            if status.as_u16() == 404 && error_text.contains("not found") {
                return Err(PilotError::ModelNotFound(model.to_string()));
            }

            return Err(PilotError::ollama(format!(
                "Ollama API error ({}): {}",
                status, error_text
            )));
        }

        Ok(response)
    }
}

#[async_trait]
impl LLMProvider for OllamaClient {
    async fn chat(
        &self,
        model: &str,
        messages: &[Message],
        options: Option<GenerateOptions>,
    ) -> Result<LLMResponse> {
        let request = ChatRequest {
            model,
            messages,
            options: options.map(OllamaOptions::from),
            stream: false,
        };

        let response = self.post_chat(model, &request).await?;
        let response_text = response.text().await?;
        debug!(target: "pilot::llm", len = response_text.len(), "ollama chat response");

        let chat_response: ChatResponse = serde_json::from_str(&response_text)
            .map_err(|e| PilotError::ollama(format!("Failed to parse response: {}", e)))?;

        Ok(LLMResponse {
            content: chat_response.message.content,
            usage: token_usage(chat_response.prompt_eval_count, chat_response.eval_count),
            model: chat_response.model,
        })
    }

    async fn chat_stream(
        &self,
        model: &str,
        messages: &[Message],
        options: Option<GenerateOptions>,
        on_token: &StreamCallback,
    ) -> Result<LLMResponse> {
        let request = ChatRequest {
            model,
            messages,
            options: options.map(OllamaOptions::from),
            stream: true,
        };

        let response = self.post_chat(model, &request).await?;

        let mut full_content = String::new();
        let mut final_model = model.to_string();
        let mut prompt_tokens: Option<u32> = None;
        let mut completion_tokens: Option<u32> = None;

        let mut stream = response.bytes_stream();
        let mut buffer = String::new();

        let mut handle_line = |line: &str| {
            match serde_json::from_str::<StreamChunkResponse>(line) {
                Ok(chunk) => {
                    final_model = chunk.model;
                    if let Some(msg) = chunk.message {
                        if !msg.content.is_empty() {
                            full_content.push_str(&msg.content);
                            on_token(&msg.content);
                        }
                    }
                    if chunk.done {
                        prompt_tokens = chunk.prompt_eval_count;
                        completion_tokens = chunk.eval_count;
                    }
                }
                Err(e) => debug!(target: "pilot::llm", "skipping unparsable chunk: {}", e),
            }
        };

        while let Some(chunk_result) = stream.next().await {
            let chunk =
                chunk_result.map_err(|e| PilotError::ollama(format!("Stream error: {}", e)))?;
            buffer.push_str(&String::from_utf8_lossy(&chunk));

            // Process complete JSON lines from buffer
            while let Some(newline_pos) = buffer.find('\n') {
                let line: String = buffer.drain(..=newline_pos).collect();
                let line = line.trim();
                if !line.is_empty() {
                    handle_line(line);
                }
            }
        }

        if !buffer.trim().is_empty() {
            handle_line(buffer.trim());
        }

        Ok(LLMResponse {
            content: full_content,
            usage: token_usage(prompt_tokens, completion_tokens),
            model: final_model,
        })
    }

    async fn is_model_available(&self, model: &str) -> Result<bool> {
        let models = self.list_models().await?;
        Ok(models
            .iter()
            .any(|m| m == model || m.split(':').next() == model.split(':').next()))
    }

    async fn list_models(&self) -> Result<Vec<String>> {
        let response = self
            .client
            .get(format!("{}/api/tags", self.base_url))
            .send()
            .await
            .map_err(|e| self.connect_error(e))?;

        if !response.status().is_success() {
            return Err(PilotError::ollama("Failed to list models"));
        }

        let models_response: ModelsResponse = response.json().await?;
        Ok(models_response.models.into_iter().map(|m| m.name).collect())
    }

    fn name(&self) -> &str {
        "ollama"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = OllamaClient::with_base_url("http://localhost:11434").unwrap();
        assert_eq!(client.base_url(), "http://localhost:11434");
    }

    #[test]
    fn test_request_serialization_skips_empty_options() {
        let messages = vec![Message::user("Hello")];
        let request = ChatRequest {
            model: "qwen3:8b",
            messages: &messages,
            options: None,
            stream: false,
        };
        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("\"role\":\"user\""));
        assert!(!json.contains("options"));
    }

    #[test]
    fn test_token_usage_requires_both_counts() {
        assert!(token_usage(Some(3), None).is_none());
        assert_eq!(token_usage(Some(3), Some(4)).unwrap().total_tokens, 7);
    }
}
