//! Oracle adapter
//!
//! The feedback loop only needs `generate(prompt) -> String`. `LlmOracle`
//! provides that on top of any `LLMProvider`.

use std::sync::Arc;

use async_trait::async_trait;

use crate::core::Result;
use crate::llm::traits::{GenerateOptions, LLMProvider, Message, StreamCallback};

/// External text-generation or verification service
#[async_trait]
pub trait Oracle: Send + Sync {
    /// Produce text for a prompt
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// Oracle backed by a chat model
pub struct LlmOracle {
    provider: Arc<dyn LLMProvider>,
    model: String,
    system_prompt: Option<String>,
    temperature: f32,
    on_token: Option<StreamCallback>,
}

impl LlmOracle {
    pub fn new(provider: Arc<dyn LLMProvider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            system_prompt: None,
            temperature: 0.2,
            on_token: None,
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Stream tokens through `on_token` while generating
    pub fn with_stream(mut self, on_token: StreamCallback) -> Self {
        self.on_token = Some(on_token);
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl Oracle for LlmOracle {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let mut messages = Vec::with_capacity(2);
        if let Some(ref system) = self.system_prompt {
            messages.push(Message::system(system.clone()));
        }
        messages.push(Message::user(prompt));

        let options = Some(GenerateOptions {
            temperature: Some(self.temperature),
            ..Default::default()
        });

        let response = match self.on_token {
            Some(ref on_token) => {
                self.provider
                    .chat_stream(&self.model, &messages, options, on_token)
                    .await?
            }
            None => self.provider.chat(&self.model, &messages, options).await?,
        };

        Ok(response.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::traits::LLMResponse;
    use std::sync::Mutex;

    struct EchoProvider {
        seen: Mutex<Vec<Message>>,
    }

    #[async_trait]
    impl LLMProvider for EchoProvider {
        async fn chat(
            &self,
            model: &str,
            messages: &[Message],
            _options: Option<GenerateOptions>,
        ) -> Result<LLMResponse> {
            self.seen.lock().unwrap().extend(messages.iter().cloned());
            Ok(LLMResponse {
                content: format!("{}:{}", model, messages.last().unwrap().content),
                usage: None,
                model: model.to_string(),
            })
        }

        async fn chat_stream(
            &self,
            model: &str,
            messages: &[Message],
            options: Option<GenerateOptions>,
            on_token: &StreamCallback,
        ) -> Result<LLMResponse> {
            let response = self.chat(model, messages, options).await?;
            on_token(&response.content);
            Ok(response)
        }

        async fn is_model_available(&self, _model: &str) -> Result<bool> {
            Ok(true)
        }

        async fn list_models(&self) -> Result<Vec<String>> {
            Ok(vec!["echo".to_string()])
        }

        fn name(&self) -> &str {
            "echo"
        }
    }

    #[tokio::test]
    async fn test_generate_prepends_system_prompt() {
        let provider = Arc::new(EchoProvider {
            seen: Mutex::new(Vec::new()),
        });
        let oracle = LlmOracle::new(provider.clone(), "echo").with_system_prompt("be brief");

        let out = oracle.generate("hello").await.unwrap();
        assert_eq!(out, "echo:hello");

        let seen = provider.seen.lock().unwrap();
        assert_eq!(seen[0].role, "system");
        assert_eq!(seen[1].content, "hello");
    }

    #[tokio::test]
    async fn test_generate_streams_when_callback_set() {
        let provider = Arc::new(EchoProvider {
            seen: Mutex::new(Vec::new()),
        });
        let streamed = Arc::new(Mutex::new(String::new()));
        let sink = Arc::clone(&streamed);
        let oracle = LlmOracle::new(provider, "echo").with_stream(Box::new(move |token: &str| {
            sink.lock().unwrap().push_str(token);
        }));

        oracle.generate("hi").await.unwrap();
        assert_eq!(streamed.lock().unwrap().as_str(), "echo:hi");
    }
}
