pub mod context;
pub mod visualization;

use crate::db::executor::ExecutionResult;
use crate::llm::LlmManager;
use crate::llm::models::{ChatMessage, CompletionRequest};
use crate::llm::prompts::ANALYSIS_SYSTEM;
use regex::Regex;
use serde::Serialize;
use std::sync::{Arc, LazyLock};
use tracing::{info, warn};
use visualization::{VisualizationKind, VisualizationPayload, detect_kind, shape};

pub const NO_DATA_NARRATIVE: &str = "Aucune donnée trouvée pour cette requête. \
Essayez d'élargir la période analysée ou de reformuler votre question.";

// Fallback for replies that only look like JSON; the capture keeps escapes.
static ANALYSIS_FIELD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""analysis"\s*:\s*("(?:[^"\\]|\\.)*")"#).expect("static analysis pattern")
});

#[derive(Debug, Clone)]
pub struct AnalysisContext<'a> {
    pub question: &'a str,
    pub sql_explanation: Option<&'a str>,
    pub suggest_visualization: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub narrative: String,
    pub visualization_kind: Option<VisualizationKind>,
    pub visualization_payload: Option<VisualizationPayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn degraded(row_count: usize, error: String) -> AnalysisResult {
    AnalysisResult {
        narrative: format!(
            "Voici les données que vous avez demandées. La requête a retourné {} ligne(s) de résultats.",
            row_count
        ),
        visualization_kind: None,
        visualization_payload: None,
        error: Some(error),
    }
}

/// `analysis` field of a JSON reply (bare or wrapped in prose), otherwise
/// the whole reply.
fn narrative_from(response: &str) -> String {
    let trimmed = response.trim();
    let object = match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if start < end => &trimmed[start..=end],
        _ => trimmed,
    };

    if let Ok(serde_json::Value::Object(map)) = serde_json::from_str::<serde_json::Value>(object) {
        if let Some(analysis) = map.get("analysis").and_then(|v| v.as_str()) {
            return analysis.to_string();
        }
    }

    ANALYSIS_FIELD
        .captures(trimmed)
        .and_then(|caps| serde_json::from_str::<String>(&caps[1]).ok())
        .unwrap_or_else(|| trimmed.to_string())
}

fn user_message(result: &ExecutionResult, context: &AnalysisContext<'_>) -> String {
    let mut message = format!(
        "QUESTION ORIGINALE: \"{}\"\n\nREQUÊTE SQL EXÉCUTÉE:\n{}\n",
        context.question, result.sql
    );
    if let Some(explanation) = context.sql_explanation {
        message.push_str(&format!("\nEXPLICATION DE LA REQUÊTE: {}\n", explanation));
    }
    message.push_str(&format!(
        "\n{}\n\n{}\n\nAnalyse ces résultats et fournis des insights pertinents pour un pharmacien.",
        context::query_context(context.question),
        context::data_context(&result.columns, &result.rows, result.row_count)
    ));
    if context.suggest_visualization {
        message.push_str(" Suggère aussi le type de visualisation le plus approprié pour ces données.");
    }
    message
}

/// Turns an execution result into a narrative and a chart suggestion.
/// Never fails: backend problems yield a generic row-count narrative.
pub struct ResultAnalyzer {
    llm: Arc<LlmManager>,
}

impl ResultAnalyzer {
    pub fn new(llm: Arc<LlmManager>) -> Self {
        Self { llm }
    }

    pub async fn analyze(&self, result: &ExecutionResult, context: &AnalysisContext<'_>) -> AnalysisResult {
        if result.rows.is_empty() {
            let (kind, payload) = if context.suggest_visualization {
                (
                    Some(VisualizationKind::Table),
                    Some(shape(VisualizationKind::Table, &result.columns, &[])),
                )
            } else {
                (None, None)
            };
            return AnalysisResult {
                narrative: NO_DATA_NARRATIVE.to_string(),
                visualization_kind: kind,
                visualization_payload: payload,
                error: None,
            };
        }

        let request = CompletionRequest::new(vec![
            ChatMessage::system(ANALYSIS_SYSTEM),
            ChatMessage::user(user_message(result, context)),
        ])
        .temperature(0.3)
        .max_tokens(1500);

        let response = match self.llm.complete(request).await {
            Ok(completion) => completion.content,
            Err(e) => {
                warn!(error = %e, "result analysis failed, returning generic narrative");
                return degraded(result.row_count, e.to_string());
            }
        };

        let (kind, payload) = if context.suggest_visualization {
            let kind = detect_kind(&response);
            (Some(kind), Some(shape(kind, &result.columns, &result.rows)))
        } else {
            (None, None)
        };
        info!(rows = result.row_count, kind = ?kind, "analysis complete");

        AnalysisResult {
            narrative: narrative_from(&response),
            visualization_kind: kind,
            visualization_payload: payload,
            error: None,
        }
    }
}
