use crate::config::LlmConfig;
use crate::llm::models::{Completion, CompletionRequest, TokenUsage};
use crate::llm::{ChatBackend, LlmError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error};

pub const DEFAULT_API_URL: &str = "https://api.openai.com/v1/chat/completions";

/// OpenAI-compatible `/v1/chat/completions` client.
pub struct RemoteLlmProvider {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
}

#[derive(Serialize)]
struct PromptRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct PromptResponse {
    #[serde(default)]
    model: Option<String>,
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<TokenUsage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

impl RemoteLlmProvider {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let api_url = config
            .api_url
            .clone()
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());

        let api_key = config
            .api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| LlmError::Config("API key is required for remote LLM provider".to_string()))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LlmError::Connection(e.to_string()))?;

        Ok(Self {
            client,
            api_url,
            api_key,
            model: config.model.clone(),
        })
    }
}

fn role_name(role: crate::llm::models::ChatRole) -> &'static str {
    use crate::llm::models::ChatRole;
    match role {
        ChatRole::System => "system",
        ChatRole::User => "user",
        ChatRole::Assistant => "assistant",
    }
}

#[async_trait]
impl ChatBackend for RemoteLlmProvider {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, LlmError> {
        let body = PromptRequest {
            model: &self.model,
            messages: request
                .messages
                .iter()
                .map(|msg| Message {
                    role: role_name(msg.role),
                    content: &msg.content,
                })
                .collect(),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        debug!(model = %self.model, messages = body.messages.len(), "sending chat completion");

        let response = self
            .client
            .post(&self.api_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Connection(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_body = response.text().await.unwrap_or_default();
            error!("Chat completion API responded with {}: {}", status, error_body);
            return Err(LlmError::Response(format!(
                "API responded with status code: {}",
                status
            )));
        }

        let prompt_response: PromptResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Response(e.to_string()))?;

        let content = prompt_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::Response("No choices in response".to_string()))?
            .message
            .content
            .unwrap_or_default();

        Ok(Completion {
            content,
            model: prompt_response.model.unwrap_or_else(|| self.model.clone()),
            usage: prompt_response.usage.unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::llm::models::ChatMessage;

    fn config_for(url: String) -> LlmConfig {
        let mut config = AppConfig::default().llm;
        config.api_url = Some(url);
        config.api_key = Some("sk-test".to_string());
        config
    }

    #[tokio::test]
    async fn posts_chat_completion_with_bearer_token() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/chat/completions")
            .match_header("authorization", "Bearer sk-test")
            .match_body(mockito::Matcher::PartialJsonString(
                r#"{"model":"gpt-3.5-turbo","temperature":0.1,"max_tokens":1000}"#.to_string(),
            ))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"model":"gpt-3.5-turbo-0125","choices":[{"message":{"role":"assistant","content":"SELECT 1"}}],
                    "usage":{"prompt_tokens":12,"completion_tokens":3,"total_tokens":15}}"#,
            )
            .create_async()
            .await;

        let provider =
            RemoteLlmProvider::new(&config_for(format!("{}/v1/chat/completions", server.url()))).expect("provider");
        let request = CompletionRequest::new(vec![ChatMessage::user("q")])
            .temperature(0.1)
            .max_tokens(1000);
        let completion = provider.complete(&request).await.expect("completion");

        mock.assert_async().await;
        assert_eq!(completion.content, "SELECT 1");
        assert_eq!(completion.model, "gpt-3.5-turbo-0125");
        assert_eq!(completion.usage.total_tokens, 15);
    }

    #[tokio::test]
    async fn error_status_is_a_response_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/")
            .with_status(429)
            .with_body("rate limited")
            .create_async()
            .await;

        let provider = RemoteLlmProvider::new(&config_for(server.url())).expect("provider");
        let result = provider.complete(&CompletionRequest::default()).await;
        assert!(matches!(result, Err(LlmError::Response(_))));
    }

    #[test]
    fn missing_key_is_a_config_error() {
        let mut config = AppConfig::default().llm;
        config.api_key = None;
        assert!(matches!(RemoteLlmProvider::new(&config), Err(LlmError::Config(_))));
    }
}
