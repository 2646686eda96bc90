//! Integration tests for the cross-origin policy
//!
//! Every response carries the permissive CORS headers; preflight OPTIONS
//! requests short-circuit with 200 and an empty body without touching the
//! handlers or the database.

use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use intake::{
    app::build_router,
    config::{Config, DatabaseConfig, ObservabilityConfig, ServerConfig},
    handlers::AppState,
};
use std::sync::Arc;
use tower::ServiceExt; // for `oneshot`

fn create_test_state() -> AppState {
    let config = Config {
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 8080,
            backend_name: "backend-a".to_string(),
        },
        database: DatabaseConfig {
            host: "127.0.0.1".to_string(),
            port: 1,
            user: "nobody".to_string(),
            password: "unused".to_string(),
            database: "nothing".to_string(),
            max_connections: 2,
        },
        observability: ObservabilityConfig {
            log_level: "info".to_string(),
        },
    };
    AppState::new(Arc::new(config)).expect("state should build")
}

fn preflight() -> Request<Body> {
    Request::builder()
        .method("OPTIONS")
        .uri("/")
        .header(header::ORIGIN, "http://example.com")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "content-type")
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn preflight_short_circuits_with_200_and_empty_body() {
    let response = build_router(create_test_state())
        .oneshot(preflight())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .and_then(|v| v.to_str().ok()),
        Some("*")
    );
    let allow_methods = response
        .headers()
        .get(header::ACCESS_CONTROL_ALLOW_METHODS)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(allow_methods.contains("POST"));

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert!(body.is_empty(), "preflight body must be empty");
}

#[tokio::test]
async fn simple_requests_carry_the_allow_origin_header() {
    let response = build_router(create_test_state())
        .oneshot(
            Request::builder()
                .uri("/healthz")
                .header(header::ORIGIN, "http://example.com")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .and_then(|v| v.to_str().ok()),
        Some("*")
    );
}

#[tokio::test]
async fn interleaved_preflights_do_not_disturb_post_accounting() {
    let state = create_test_state();
    let router = build_router(state.clone());

    // Fire preflights and (failing, DB-down) POSTs concurrently.
    let mut handles = Vec::new();
    for i in 0..10 {
        let router = router.clone();
        handles.push(tokio::spawn(async move {
            if i % 2 == 0 {
                let response = router.oneshot(preflight()).await.unwrap();
                assert_eq!(response.status(), StatusCode::OK);
                let body = axum::body::to_bytes(response.into_body(), usize::MAX)
                    .await
                    .unwrap();
                assert!(body.is_empty());
            } else {
                let response = router
                    .oneshot(
                        Request::builder()
                            .method("POST")
                            .uri("/")
                            .body(Body::empty())
                            .unwrap(),
                    )
                    .await
                    .unwrap();
                assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
            }
        }));
    }
    for handle in handles {
        handle.await.expect("task should not panic");
    }

    let output = state.metrics().export();
    // POST accounting reflects exactly the five POSTs; OPTIONS traffic lands
    // in its own label-set.
    assert!(
        output.contains("requests_total{method=\"POST\",path=\"root\",status=\"500\"} 5\n"),
        "POST label-set must be unaffected by OPTIONS traffic:\n{output}"
    );
    assert!(
        output.contains("requests_total{method=\"OPTIONS\",path=\"root\",status=\"200\"} 5\n"),
        "preflights are accounted under their own label-set:\n{output}"
    );
}
