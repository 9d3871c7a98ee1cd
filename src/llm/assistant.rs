use crate::domain::{QuestionCategory, is_pharmacy_related};
use crate::llm::LlmManager;
use crate::llm::models::{ChatMessage, CompletionRequest, limit_history};
use crate::llm::prompts;
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

pub const MAX_HISTORY_MESSAGES: usize = 5;

pub const APOLOGY: &str = "Désolé, une erreur s'est produite lors de la génération de la réponse. \
Veuillez réessayer ultérieurement.";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatReply {
    pub answer: String,
    pub conversation_id: String,
    pub timestamp: i64,
}

/// Free-form pharmacy Q&A, no SQL involved.
pub struct ChatAssistant {
    llm: Arc<LlmManager>,
}

impl ChatAssistant {
    pub fn new(llm: Arc<LlmManager>) -> Self {
        Self { llm }
    }

    pub async fn reply(
        &self,
        message: &str,
        conversation_id: Option<String>,
        history: &[ChatMessage],
    ) -> ChatReply {
        let conversation_id = conversation_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let category = QuestionCategory::detect(message);
        let mut messages = vec![ChatMessage::system(prompts::assistant_system(
            category,
            is_pharmacy_related(message),
        ))];
        messages.extend(limit_history(history, MAX_HISTORY_MESSAGES));
        messages.push(ChatMessage::user(message));

        let answer = match self.llm.complete(CompletionRequest::new(messages)).await {
            Ok(completion) => {
                info!(%conversation_id, category = category.label(), "chat answered");
                completion.content
            }
            Err(e) => {
                error!(%conversation_id, error = %e, "chat completion failed");
                APOLOGY.to_string()
            }
        };

        ChatReply {
            answer,
            conversation_id,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::llm::models::ChatRole;
    use crate::testing::{FailingBackend, ScriptedBackend};

    fn assistant(backend: Arc<dyn crate::llm::ChatBackend>) -> ChatAssistant {
        ChatAssistant::new(Arc::new(LlmManager::with_backend(backend, &AppConfig::default().llm)))
    }

    #[tokio::test]
    async fn reply_keeps_conversation_and_trims_history() {
        let backend = Arc::new(ScriptedBackend::new(["Vos ventes progressent."]));
        let history: Vec<ChatMessage> = (0..8)
            .map(|i| ChatMessage::assistant(format!("réponse {i}")))
            .collect();

        let reply = assistant(backend.clone())
            .reply("Comment vont mes ventes ?", Some("conv-1".to_string()), &history)
            .await;

        assert_eq!(reply.answer, "Vos ventes progressent.");
        assert_eq!(reply.conversation_id, "conv-1");
        assert!(reply.timestamp > 0);

        let sent = &backend.requests()[0];
        assert_eq!(sent.messages.len(), 1 + MAX_HISTORY_MESSAGES + 1);
        assert_eq!(sent.messages[0].role, ChatRole::System);
        assert!(sent.messages[0].content.contains("question sur les ventes"));
        assert_eq!(sent.messages[1].content, "réponse 3");
    }

    #[tokio::test]
    async fn missing_conversation_id_gets_a_uuid() {
        let backend = Arc::new(ScriptedBackend::new(["ok"]));
        let reply = assistant(backend).reply("Bonjour", None, &[]).await;
        assert!(Uuid::parse_str(&reply.conversation_id).is_ok());
    }

    #[tokio::test]
    async fn backend_failure_is_an_apology_not_an_error() {
        let reply = assistant(Arc::new(FailingBackend)).reply("Mes stocks ?", None, &[]).await;
        assert_eq!(reply.answer, APOLOGY);
    }
}
