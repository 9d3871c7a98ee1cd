pub mod assistant;
pub mod models;
pub mod prompts;
pub mod providers;

use crate::config::LlmConfig;
use crate::llm::models::{Completion, CompletionRequest};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("LLM connection error: {0}")]
    Connection(String),
    #[error("LLM response error: {0}")]
    Response(String),
    #[error("LLM configuration error: {0}")]
    Config(String),
}

/// A chat-completion service.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, LlmError>;
}

/// Process-wide handle to the configured backend, built once at startup.
pub struct LlmManager {
    backend: Arc<dyn ChatBackend>,
    default_temperature: f32,
    default_max_tokens: u32,
}

impl LlmManager {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let backend: Arc<dyn ChatBackend> = match config.backend.as_str() {
            "remote" => Arc::new(providers::remote::RemoteLlmProvider::new(config)?),
            "ollama" => Arc::new(providers::ollama::OllamaProvider::new(config)?),
            _ => {
                return Err(LlmError::Config(format!(
                    "Unsupported LLM backend: {}",
                    config.backend
                )));
            }
        };

        Ok(Self::with_backend(backend, config))
    }

    pub fn with_backend(backend: Arc<dyn ChatBackend>, config: &LlmConfig) -> Self {
        Self {
            backend,
            default_temperature: config.temperature,
            default_max_tokens: config.max_tokens,
        }
    }

    pub async fn complete(&self, mut request: CompletionRequest) -> Result<Completion, LlmError> {
        request.temperature.get_or_insert(self.default_temperature);
        request.max_tokens.get_or_insert(self.default_max_tokens);

        let completion = self.backend.complete(&request).await?;
        debug!(
            model = %completion.model,
            prompt_tokens = completion.usage.prompt_tokens,
            completion_tokens = completion.usage.completion_tokens,
            "completion received"
        );
        Ok(completion)
    }
}
