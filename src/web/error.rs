use crate::db::executor::ExecutionError;
use crate::feedback::FeedbackError;
use crate::pipeline::PipelineError;
use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Missing required field: {0}")]
    MissingField(&'static str),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Unsafe query: {0}")]
    UnsafeQuery(String),
    #[error("SQL generation failed: {0}")]
    Generation(String),
    #[error("The language backend is not available")]
    BackendUnavailable,
    #[error("{0}")]
    Execution(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::MissingField(_)
            | ApiError::InvalidInput(_)
            | ApiError::UnsafeQuery(_)
            | ApiError::Generation(_) => StatusCode::BAD_REQUEST,
            ApiError::BackendUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Execution(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::MissingField(_) => "missing_field",
            ApiError::InvalidInput(_) => "invalid_input",
            ApiError::UnsafeQuery(_) => "unsafe_query",
            ApiError::Generation(_) => "generation_failed",
            ApiError::BackendUnavailable => "service_unavailable",
            ApiError::Execution(_) => "execution_failed",
            ApiError::Internal(_) => "internal_error",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(code = self.code(), "{}", self);
        }
        let body = json!({
            "status": "error",
            "code": self.code(),
            "message": self.to_string(),
        });
        (status, Json(body)).into_response()
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Generation(reason) => ApiError::Generation(reason),
            PipelineError::Unsafe(reason) => ApiError::UnsafeQuery(reason),
            execution @ PipelineError::Execution { .. } => ApiError::Execution(execution.to_string()),
        }
    }
}

impl From<ExecutionError> for ApiError {
    fn from(err: ExecutionError) -> Self {
        match err {
            ExecutionError::Unsafe(reason) => ApiError::UnsafeQuery(reason),
            other => ApiError::Execution(other.to_string()),
        }
    }
}

impl From<FeedbackError> for ApiError {
    fn from(err: FeedbackError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::InvalidInput(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::InvalidInput(rejection.body_text())
    }
}
