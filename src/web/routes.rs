use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};

use super::handlers;
use super::state::AppState;

// API Routes - REST API consumed by the pharmacy dashboard
pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new().nest(
        "/api",
        Router::new()
            // Assistant endpoints
            .route("/ai/analyze", post(handlers::api::analyze))
            .route("/chat", post(handlers::api::chat))
            .route("/feedback", post(handlers::api::submit_feedback))
            // Read-only listings
            .route("/pharmacies", get(handlers::listings::pharmacies))
            .route("/products", get(handlers::listings::products))
            .route("/sales", get(handlers::listings::sales))
            .route("/inventory", get(handlers::listings::inventory))
            // System status
            .route("/db/test-connection", get(handlers::api::test_connection))
            .route("/status", get(handlers::api::system_status)),
    )
}

pub fn app(state: Arc<AppState>) -> Router {
    api_routes()
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CompressionLayer::new())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::llm::{ChatBackend, LlmManager};
    use crate::testing::{P1, ScriptedBackend, seeded_pool};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn state_with(backend: Option<Arc<dyn ChatBackend>>, log_dir: &std::path::Path) -> Arc<AppState> {
        let mut config = AppConfig::default();
        config.feedback.log_dir = log_dir.to_string_lossy().into_owned();
        let llm = backend.map(|b| Arc::new(LlmManager::with_backend(b, &config.llm)));
        Arc::new(AppState::new(config, seeded_pool(), llm))
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .expect("request")
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).expect("request")
    }

    async fn send(state: Arc<AppState>, request: Request<Body>) -> (StatusCode, Value) {
        let response = app(state).oneshot(request).await.expect("response");
        let status = response.status();
        let bytes = response.into_body().collect().await.expect("body").to_bytes();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn analyze_without_question_is_a_bad_request() {
        let dir = tempfile::tempdir().expect("tempdir");
        let backend: Arc<dyn ChatBackend> = Arc::new(ScriptedBackend::new(Vec::<String>::new()));
        let state = state_with(Some(backend), dir.path());

        let body = json!({ "tenantId": P1 }).to_string();
        let (status, value) = send(state, post_json("/api/ai/analyze", &body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(value["status"], "error");
        assert_eq!(value["code"], "missing_field");
    }

    #[tokio::test]
    async fn malformed_json_is_a_bad_request() {
        let dir = tempfile::tempdir().expect("tempdir");
        let state = state_with(None, dir.path());
        let (status, value) = send(state, post_json("/api/ai/analyze", "{not json")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(value["code"], "invalid_input");
    }

    #[tokio::test]
    async fn missing_backend_is_service_unavailable() {
        let dir = tempfile::tempdir().expect("tempdir");
        let state = state_with(None, dir.path());

        let body = json!({ "question": "Mes ventes ?", "tenantId": P1 }).to_string();
        let (status, _) = send(state.clone(), post_json("/api/ai/analyze", &body)).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        let (status, _) = send(state, post_json("/api/chat", r#"{"message": "Bonjour"}"#)).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn reversed_date_range_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let backend: Arc<dyn ChatBackend> = Arc::new(ScriptedBackend::new(Vec::<String>::new()));
        let state = state_with(Some(backend), dir.path());

        let body = json!({
            "question": "Mes ventes ?",
            "tenantId": P1,
            "dateRange": { "startDate": "2024-03-31", "endDate": "2024-03-01" }
        })
        .to_string();
        let (status, value) = send(state, post_json("/api/ai/analyze", &body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(value["code"], "invalid_input");
    }

    #[tokio::test]
    async fn analyze_returns_rows_and_narrative() {
        let dir = tempfile::tempdir().expect("tempdir");
        let backend: Arc<dyn ChatBackend> = Arc::new(ScriptedBackend::new([
            r#"{"analysis": "Le Doliprane domine les ventes.", "visualizationType": "bar"}"#,
        ]));
        let state = state_with(Some(backend), dir.path());

        let body = json!({
            "question": "Quels sont mes produits les plus vendus ce mois-ci?",
            "pharmacyId": P1
        })
        .to_string();
        let (status, value) = send(state, post_json("/api/ai/analyze", &body)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(value["status"], "success");
        assert_eq!(value["sourceKind"], "template");
        assert_eq!(value["rowCount"], 2);
        assert_eq!(value["narrative"], "Le Doliprane domine les ventes.");
        assert_eq!(value["visualizationKind"], "bar");
    }

    #[tokio::test]
    async fn products_listing_counts_pharmacy_catalog() {
        let dir = tempfile::tempdir().expect("tempdir");
        let state = state_with(None, dir.path());

        let (status, value) = send(state, get(&format!("/api/products?pharmacyId={}", P1))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(value["count"], 3);
        assert_eq!(value["data"].as_array().map(Vec::len), Some(3));
    }

    #[tokio::test]
    async fn listing_without_pharmacy_is_a_bad_request() {
        let dir = tempfile::tempdir().expect("tempdir");
        let state = state_with(None, dir.path());

        let (status, value) = send(state.clone(), get("/api/products")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(value["code"], "missing_field");

        let (status, _) = send(state, get(&format!("/api/sales?pharmacyId={}", P1))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn feedback_is_logged_and_identified() {
        let dir = tempfile::tempdir().expect("tempdir");
        let state = state_with(None, dir.path());

        let body = json!({
            "messageId": "m-1",
            "userQuery": "Top ventes",
            "sqlQuery": "SELECT 1"
        })
        .to_string();
        let (status, value) = send(state, post_json("/api/feedback", &body)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(value["status"], "success");
        let id = value["feedbackId"].as_str().expect("feedback id");
        assert!(id.starts_with("sql_errors_") && id.ends_with(".jsonl:0"));
    }

    #[tokio::test]
    async fn feedback_requires_sql_query() {
        let dir = tempfile::tempdir().expect("tempdir");
        let state = state_with(None, dir.path());

        let body = json!({ "messageId": "m-1", "userQuery": "Top ventes" }).to_string();
        let (status, value) = send(state, post_json("/api/feedback", &body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(value["message"].as_str().unwrap_or_default().contains("sqlQuery"));
    }

    #[tokio::test]
    async fn status_and_connection_check() {
        let dir = tempfile::tempdir().expect("tempdir");
        let state = state_with(None, dir.path());

        let (status, value) = send(state.clone(), get("/api/db/test-connection")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(value["status"], "success");

        let (status, value) = send(state, get("/api/status")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(value["llmAvailable"], false);
        assert!(value["tableCount"].as_u64().unwrap_or(0) >= 5);
    }
}
