//! Error types for the intake service
//!
//! All errors implement `IntoResponse` for Axum handlers.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::metrics::MetricsError;

/// Main error type for the application
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Metrics error: {0}")]
    Metrics(#[from] MetricsError),

    #[error("Database not responding")]
    Database(#[from] sqlx::Error),

    #[error("Malformed multipart payload: {0}")]
    Multipart(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            Self::Database(source) => {
                tracing::error!(error = %source, "database request failed");
                let body = Json(serde_json::json!({
                    "error": "Database not responding",
                    "details": source.to_string(),
                }));
                (StatusCode::INTERNAL_SERVER_ERROR, body).into_response()
            }
            Self::Multipart(message) => {
                let body = Json(serde_json::json!({ "error": message }));
                (StatusCode::BAD_REQUEST, body).into_response()
            }
            other => {
                let body = Json(serde_json::json!({ "error": other.to_string() }));
                (StatusCode::INTERNAL_SERVER_ERROR, body).into_response()
            }
        }
    }
}

/// Convenience type alias for Results
pub type AppResult<T> = Result<T, AppError>;
