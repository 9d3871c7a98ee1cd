use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{error, info};

use crate::domain::{AnalysisRequest, DateRange};
use crate::feedback::FeedbackEntry;
use crate::llm::assistant::ChatReply;
use crate::llm::models::ChatMessage;
use crate::pipeline::AnalysisResponse;
use crate::web::error::ApiError;
use crate::web::state::AppState;

// Request types

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeBody {
    #[serde(default, alias = "query")]
    pub question: Option<String>,
    #[serde(default, alias = "pharmacyId")]
    pub tenant_id: Option<String>,
    #[serde(default)]
    pub date_range: Option<DateRange>,
    #[serde(default)]
    pub conversation_history: Vec<ChatMessage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatBody {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default, alias = "messageHistory")]
    pub conversation_history: Vec<ChatMessage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackBody {
    #[serde(default)]
    pub message_id: Option<String>,
    #[serde(default)]
    pub user_query: Option<String>,
    #[serde(default)]
    pub sql_query: Option<String>,
    #[serde(default)]
    pub timestamp: Option<i64>,
    #[serde(default)]
    pub notes: Option<String>,
}

// System status

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemStatus {
    pub version: String,
    pub uptime_seconds: i64,
    pub llm_available: bool,
    pub table_count: usize,
}

/// Trimmed, non-empty value of a required body field.
fn required(value: Option<String>, field: &'static str) -> Result<String, ApiError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or(ApiError::MissingField(field))
}

// API Implementations

pub async fn analyze(
    State(state): State<Arc<AppState>>,
    body: Result<Json<AnalyzeBody>, JsonRejection>,
) -> Result<Json<AnalysisResponse>, ApiError> {
    let Json(body) = body?;

    let question = required(body.question, "question")?;
    let tenant_id = required(body.tenant_id, "tenantId")?;
    if let Some(range) = &body.date_range {
        if !range.is_ordered() {
            return Err(ApiError::InvalidInput(format!(
                "dateRange start {} is after end {}",
                range.start, range.end
            )));
        }
    }

    let pipeline = state.pipeline.as_ref().ok_or(ApiError::BackendUnavailable)?;

    let mut request = AnalysisRequest::new(question, tenant_id);
    if let Some(range) = body.date_range {
        request = request.with_date_range(range);
    }
    request.history = body.conversation_history;

    info!(tenant_id = %request.tenant_id, "Analyzing question: {}", request.question);
    let response = pipeline.run(&request).await?;
    Ok(Json(response))
}

pub async fn chat(
    State(state): State<Arc<AppState>>,
    body: Result<Json<ChatBody>, JsonRejection>,
) -> Result<Json<ChatReply>, ApiError> {
    let assistant = state.assistant.as_ref().ok_or(ApiError::BackendUnavailable)?;
    let Json(body) = body?;
    let message = required(body.message, "message")?;

    let reply = assistant
        .reply(&message, body.conversation_id, &body.conversation_history)
        .await;
    Ok(Json(reply))
}

pub async fn submit_feedback(
    State(state): State<Arc<AppState>>,
    body: Result<Json<FeedbackBody>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(body) = body?;

    let entry = FeedbackEntry {
        message_id: required(body.message_id, "messageId")?,
        user_query: required(body.user_query, "userQuery")?,
        sql_query: required(body.sql_query, "sqlQuery")?,
        timestamp: body
            .timestamp
            .unwrap_or_else(|| chrono::Utc::now().timestamp_millis()),
        notes: body.notes.filter(|n| !n.trim().is_empty()),
    };

    let feedback_id = state.feedback.record(&entry).await?;
    Ok(Json(json!({
        "status": "success",
        "message": "Feedback enregistré avec succès",
        "feedbackId": feedback_id,
    })))
}

pub async fn test_connection(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    let pool = state.db_pool.clone();
    let ping = tokio::task::spawn_blocking(move || -> Result<i64, String> {
        let conn = pool.get().map_err(|e| e.to_string())?;
        conn.query_row("SELECT 1", [], |row| row.get(0))
            .map_err(|e| e.to_string())
    })
    .await
    .map_err(|e| ApiError::Internal(e.to_string()))?;

    match ping {
        Ok(_) => Ok(Json(json!({
            "status": "success",
            "message": "Connexion à la base de données établie",
            "timestamp": chrono::Utc::now().to_rfc3339(),
        }))),
        Err(e) => {
            error!("Database connection test failed: {}", e);
            Err(ApiError::Execution(format!("Database connection failed: {}", e)))
        }
    }
}

pub async fn system_status(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SystemStatus>, ApiError> {
    let now = chrono::Utc::now();
    let uptime = now.signed_duration_since(state.startup_time).num_seconds();

    let pool = state.db_pool.clone();
    let table_count = tokio::task::spawn_blocking(move || -> Result<i64, String> {
        let conn = pool.get().map_err(|e| e.to_string())?;
        conn.query_row(
            "SELECT COUNT(*) FROM information_schema.tables WHERE table_schema = 'main'",
            [],
            |row| row.get(0),
        )
        .map_err(|e| e.to_string())
    })
    .await
    .map_err(|e| ApiError::Internal(e.to_string()))?
    .map_err(|e| {
        error!("Failed to get table count: {}", e);
        ApiError::Execution(e)
    })?;

    Ok(Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: uptime,
        llm_available: state.llm_available(),
        table_count: table_count.max(0) as usize,
    }))
}
