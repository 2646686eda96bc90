//! Health and readiness endpoints
//!
//! Kubernetes-style probes plus a simple status endpoint. None of these
//! touch the database, so they keep answering while the store is down.

use axum::{Json, extract::State};
use serde::Serialize;

use crate::handlers::AppState;

/// Probe response body (`/healthz` and `/readyz`)
#[derive(Debug, Serialize)]
pub struct ProbeResponse {
    pub status: &'static str,
    pub service: String,
}

/// Status response body (`/health`)
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub backend: String,
    pub port: u16,
}

/// Liveness probe — the process is alive.
pub async fn healthz(State(state): State<AppState>) -> Json<ProbeResponse> {
    Json(ProbeResponse {
        status: "ok",
        service: state.config().server.backend_name.clone(),
    })
}

/// Readiness probe — static readiness.
///
/// Reports ready without probing the database, so a service with an
/// unreachable store still receives traffic (and answers it with 500s).
/// Known limitation of the probe scheme, kept deliberately.
pub async fn readyz(State(state): State<AppState>) -> Json<ProbeResponse> {
    Json(ProbeResponse {
        status: "ready",
        service: state.config().server.backend_name.clone(),
    })
}

/// Simple status endpoint with the listen port.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        backend: state.config().server.backend_name.clone(),
        port: state.config().server.port,
    })
}
