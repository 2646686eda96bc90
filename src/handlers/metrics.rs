//! Metrics exposition endpoint
//!
//! Serves the registry's current state in Prometheus text format for
//! scraping. Read-only over shared registry state; scraping concurrently
//! with request traffic is safe.

use axum::{extract::State, http::header, response::IntoResponse};

use crate::handlers::AppState;
use crate::metrics::TEXT_FORMAT;

/// Metrics handler for Prometheus scraping
pub async fn handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, TEXT_FORMAT)],
        state.metrics().export(),
    )
}
