//! Router assembly
//!
//! Builds the full middleware stack around the route table. Layer order
//! matters: the timing layer sits outside CORS and the routes, so its
//! completion guard covers preflight short-circuits and routing misses as
//! well as handler work.

use axum::{
    Router,
    http::{Method, header},
    routing::{get, post},
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers::{self, AppState};
use crate::middleware::{TimingLayer, request_id_middleware};

/// Build the service router with the complete middleware stack.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", post(handlers::ingest::handler))
        .route("/healthz", get(handlers::health::healthz))
        .route("/readyz", get(handlers::health::readyz))
        .route("/health", get(handlers::health::health))
        .route("/metrics", get(handlers::metrics::handler))
        .layer(cors_layer())
        .layer(TimingLayer::new(state.metrics().clone()))
        .layer(axum::middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Permissive cross-origin policy: any origin, the three methods the service
/// answers, and the `Content-Type` request header. Preflight `OPTIONS`
/// requests are answered directly by the layer with 200 and an empty body.
fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE])
}
