use crate::domain::AnalysisRequest;
use crate::llm::LlmManager;
use crate::llm::models::{ChatMessage, CompletionRequest, limit_history};
use crate::llm::prompts;
use crate::sql::extract::extract_candidate;
use crate::sql::{SourceKind, SqlCandidate};
use std::sync::Arc;
use tracing::{info, warn};

/// Prior turns forwarded to the backend.
pub const MAX_HISTORY_MESSAGES: usize = 10;

pub const FALLBACK_CONFIDENCE: f64 = 0.3;
const DEFAULT_CONFIDENCE: f64 = 0.5;

/// Top sellers by quantity, used when nothing usable comes back.
pub const FALLBACK_SQL: &str = r#"SELECT ip.name AS "Nom du produit", SUM(ds.quantity) AS "Quantité vendue"
FROM data_sales ds
JOIN data_inventorysnapshot dis ON ds.product_id = dis.id
JOIN data_internalproduct ip ON dis.product_id = ip.id
WHERE ip.pharmacy_id = $1
  AND ds.date BETWEEN CAST($2 AS DATE) AND CAST($3 AS DATE)
GROUP BY ip.name
ORDER BY SUM(ds.quantity) DESC
LIMIT 10"#;

pub struct SqlGenerator {
    llm: Arc<LlmManager>,
}

impl SqlGenerator {
    pub fn new(llm: Arc<LlmManager>) -> Self {
        Self { llm }
    }

    fn build_messages(request: &AnalysisRequest) -> Vec<ChatMessage> {
        let mut messages = vec![ChatMessage::system(prompts::sql_generation_system())];
        messages.extend(limit_history(&request.history, MAX_HISTORY_MESSAGES));
        messages.push(ChatMessage::user(prompts::sql_generation_user(
            &request.question,
            &request.tenant_id,
            request.date_range.as_ref(),
        )));
        messages
    }

    /// Never fails: a backend error yields an empty candidate carrying the
    /// error, an unusable answer yields the fallback query.
    pub async fn generate(&self, request: &AnalysisRequest) -> SqlCandidate {
        let completion = CompletionRequest::new(Self::build_messages(request))
            .temperature(0.1)
            .max_tokens(1000);

        let content = match self.llm.complete(completion).await {
            Ok(completion) => completion.content,
            Err(e) => {
                warn!(error = %e, "SQL generation call failed");
                return SqlCandidate::new(
                    "",
                    "Une erreur s'est produite lors de la génération de la requête SQL.",
                    0.0,
                    SourceKind::Generated,
                )
                .with_error(e.to_string());
            }
        };

        let extracted = extract_candidate(&content);
        match extracted.sql {
            Some(sql) => {
                let confidence = extracted.confidence.unwrap_or(DEFAULT_CONFIDENCE);
                info!(confidence, "SQL generated");
                SqlCandidate::new(
                    sql,
                    extracted
                        .explanation
                        .unwrap_or_else(|| "Explication non disponible".to_string()),
                    confidence,
                    SourceKind::Generated,
                )
            }
            None => {
                warn!("no SELECT statement found in generation response, using fallback query");
                SqlCandidate::new(
                    FALLBACK_SQL,
                    "Requête générée à partir d'un modèle prédéfini car la génération automatique a échoué.",
                    FALLBACK_CONFIDENCE,
                    SourceKind::Fallback,
                )
                .with_error("Could not extract a valid SQL query from the response")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::llm::models::ChatRole;
    use crate::sql::safety::check_safety;
    use crate::sql::validator::run_checks;
    use crate::testing::{FailingBackend, ScriptedBackend};

    fn request() -> AnalysisRequest {
        AnalysisRequest::new("Quel est le produit le plus rentable ?", "p-1")
    }

    fn generator(backend: Arc<dyn crate::llm::ChatBackend>) -> SqlGenerator {
        SqlGenerator::new(Arc::new(LlmManager::with_backend(backend, &AppConfig::default().llm)))
    }

    #[tokio::test]
    async fn json_answer_becomes_generated_candidate() {
        let backend = Arc::new(ScriptedBackend::new([
            r#"{"sql": "SELECT 1 FROM data_sales LIMIT 1", "explanation": "Test", "confidence": 0.85}"#,
        ]));
        let candidate = generator(backend.clone()).generate(&request()).await;

        assert_eq!(candidate.sql, "SELECT 1 FROM data_sales LIMIT 1");
        assert_eq!(candidate.explanation, "Test");
        assert_eq!(candidate.confidence, 0.85);
        assert_eq!(candidate.source, SourceKind::Generated);
        assert!(candidate.error.is_none());

        let sent = &backend.requests()[0];
        assert_eq!(sent.temperature, Some(0.1));
        assert_eq!(sent.max_tokens, Some(1000));
        assert_eq!(sent.messages.first().map(|m| m.role), Some(ChatRole::System));
        assert!(sent.messages.last().map(|m| m.content.contains("p-1")).unwrap_or(false));
    }

    #[tokio::test]
    async fn history_sits_between_system_and_question() {
        let backend = Arc::new(ScriptedBackend::new(["SELECT 1 FROM t LIMIT 1"]));
        let mut req = request();
        req.history = (0..12).map(|i| ChatMessage::user(format!("turn {i}"))).collect();

        generator(backend.clone()).generate(&req).await;

        let sent = &backend.requests()[0];
        assert_eq!(sent.messages.len(), 1 + MAX_HISTORY_MESSAGES + 1);
        assert_eq!(sent.messages[1].content, "turn 2");
    }

    #[tokio::test]
    async fn answer_without_select_yields_fallback() {
        let backend = Arc::new(ScriptedBackend::new(["Désolé, je ne sais pas."]));
        let candidate = generator(backend).generate(&request()).await;

        assert_eq!(candidate.sql, FALLBACK_SQL);
        assert_eq!(candidate.confidence, 0.3);
        assert_eq!(candidate.source, SourceKind::Fallback);
        assert!(candidate.error.as_deref().is_some_and(|e| !e.is_empty()));
    }

    #[tokio::test]
    async fn backend_error_yields_empty_sql() {
        let candidate = generator(Arc::new(FailingBackend)).generate(&request()).await;
        assert!(candidate.sql.is_empty());
        assert_eq!(candidate.confidence, 0.0);
        assert!(candidate.error.is_some());
    }

    #[test]
    fn fallback_query_is_clean_and_safe() {
        assert!(run_checks(FALLBACK_SQL).is_empty());
        assert!(check_safety(FALLBACK_SQL).safe);
    }
}
