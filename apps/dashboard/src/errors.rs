use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::llm_client::LlmError;
use crate::opportunities::StorageError;
use crate::sheets::SheetError;

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Feature disabled: {0}")]
    FeatureDisabled(&'static str),

    #[error("Superseded by a newer request")]
    Superseded,

    #[error("Sheet error: {0}")]
    Sheet(#[from] SheetError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            AppError::FeatureDisabled(feature) => (
                StatusCode::FORBIDDEN,
                "FEATURE_DISABLED",
                format!("The {feature} feature is disabled"),
            ),
            AppError::Superseded => (
                StatusCode::CONFLICT,
                "SUPERSEDED",
                "A newer request replaced this one; its result was discarded".to_string(),
            ),
            AppError::Sheet(SheetError::Malformed(msg)) => {
                tracing::warn!("Malformed sheet response: {msg}");
                (StatusCode::BAD_GATEWAY, "MALFORMED_SHEET", self.to_string())
            }
            AppError::Sheet(e) => {
                tracing::error!("Sheet fetch error: {e}");
                (StatusCode::BAD_GATEWAY, "SHEET_FETCH_ERROR", e.to_string())
            }
            AppError::Llm(LlmError::MissingApiKey) => (
                StatusCode::BAD_REQUEST,
                "MISSING_API_KEY",
                "Set a Gemini API key before asking questions".to_string(),
            ),
            AppError::Llm(e @ LlmError::Blocked { .. }) => {
                tracing::warn!("Query blocked by API: {e}");
                (StatusCode::UNPROCESSABLE_ENTITY, "BLOCKED", e.to_string())
            }
            AppError::Llm(LlmError::EmptyResponse) => (
                StatusCode::BAD_GATEWAY,
                "EMPTY_RESPONSE",
                "Empty response from Gemini".to_string(),
            ),
            AppError::Llm(e) => {
                tracing::error!("LLM error: {e}");
                (StatusCode::BAD_GATEWAY, "LLM_ERROR", e.to_string())
            }
            AppError::Storage(e @ StorageError::QuotaExceeded { .. }) => {
                tracing::warn!("{e}");
                (
                    StatusCode::INSUFFICIENT_STORAGE,
                    "STORAGE_QUOTA_EXCEEDED",
                    e.to_string(),
                )
            }
            AppError::Storage(e) => {
                tracing::error!("Storage error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "STORAGE_ERROR",
                    "A storage error occurred".to_string(),
                )
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal server error occurred".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}
