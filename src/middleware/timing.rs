//! Request timing middleware.
//!
//! Wraps the whole dispatch chain (routing misses and CORS preflights
//! included) and records one `requests_total` increment plus one
//! `request_duration_seconds` observation per request. Recording hangs off a
//! drop guard, so it fires exactly once however the request ends: normal
//! response, error response, panic unwinding through the handler, or the
//! connection going away before a response exists.

use axum::body::Body;
use axum::{extract::Request, response::Response};
use futures::future::BoxFuture;
use std::time::Instant;
use tower::Service;

use crate::metrics::ServiceMetrics;

/// Status recorded when the response future is dropped before completion
/// (client closed the connection). Follows nginx's 499 convention; there is
/// no real response status to report in that case.
const CLIENT_CLOSED_REQUEST: u16 = 499;

/// Tower layer installing [`TimingService`].
#[derive(Clone)]
pub struct TimingLayer {
    metrics: ServiceMetrics,
}

impl TimingLayer {
    pub fn new(metrics: ServiceMetrics) -> Self {
        Self { metrics }
    }
}

impl<S> tower::Layer<S> for TimingLayer {
    type Service = TimingService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TimingService {
            inner,
            metrics: self.metrics.clone(),
        }
    }
}

/// Tower service measuring every request it passes through.
#[derive(Clone)]
pub struct TimingService<S> {
    inner: S,
    metrics: ServiceMetrics,
}

impl<S> Service<Request> for TimingService<S>
where
    S: Service<Request, Response = Response<Body>>,
    S::Future: Send + 'static,
{
    type Response = Response<Body>;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(
        &mut self,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request) -> Self::Future {
        let guard = CompletionGuard::new(
            self.metrics.clone(),
            req.method().to_string(),
            req.uri().path().to_string(),
        );

        let fut = self.inner.call(req);

        Box::pin(async move {
            let response = fut.await?;
            guard.finish(response.status().as_u16());
            Ok(response)
        })
    }
}

/// Records the request outcome when dropped.
///
/// The clock starts at construction, before the inner service runs. Normal
/// completion passes the real status through [`CompletionGuard::finish`];
/// any other teardown path records [`CLIENT_CLOSED_REQUEST`].
struct CompletionGuard {
    metrics: ServiceMetrics,
    method: String,
    path: String,
    start: Instant,
    status: Option<u16>,
}

impl CompletionGuard {
    fn new(metrics: ServiceMetrics, method: String, path: String) -> Self {
        Self {
            metrics,
            method,
            path,
            start: Instant::now(),
            status: None,
        }
    }

    fn finish(mut self, status: u16) {
        self.status = Some(status);
        // Recording happens in Drop, which runs right here.
    }
}

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        let status = self.status.unwrap_or(CLIENT_CLOSED_REQUEST);
        if let Err(error) =
            self.metrics
                .record_request(&self.method, &self.path, status, self.start.elapsed())
        {
            tracing::error!(%error, "failed to record request metrics");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Router, http::StatusCode, routing::get};
    use tower::ServiceExt;

    fn test_router(metrics: &ServiceMetrics) -> Router {
        Router::new()
            .route("/ping", get(|| async { "pong" }))
            .route(
                "/fail",
                get(|| async { StatusCode::INTERNAL_SERVER_ERROR }),
            )
            .layer(TimingLayer::new(metrics.clone()))
    }

    async fn send(router: Router, uri: &str) -> StatusCode {
        let response = router
            .oneshot(
                axum::http::Request::builder()
                    .uri(uri)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        response.status()
    }

    #[tokio::test]
    async fn successful_request_records_counter_and_duration_once() {
        let metrics = ServiceMetrics::new().unwrap();
        let status = send(test_router(&metrics), "/ping").await;
        assert_eq!(status, StatusCode::OK);

        let output = metrics.export();
        assert!(
            output.contains("requests_total{method=\"GET\",path=\"/ping\",status=\"200\"} 1\n")
        );
        assert!(output.contains(
            "request_duration_seconds_count{method=\"GET\",path=\"/ping\",status=\"200\"} 1\n"
        ));
    }

    #[tokio::test]
    async fn error_responses_record_their_real_status() {
        let metrics = ServiceMetrics::new().unwrap();
        let status = send(test_router(&metrics), "/fail").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

        assert!(
            metrics
                .export()
                .contains("requests_total{method=\"GET\",path=\"/fail\",status=\"500\"} 1\n")
        );
    }

    #[tokio::test]
    async fn routing_misses_are_still_recorded() {
        let metrics = ServiceMetrics::new().unwrap();
        let status = send(test_router(&metrics), "/no-such-route").await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        assert!(metrics.export().contains(
            "requests_total{method=\"GET\",path=\"/no-such-route\",status=\"404\"} 1\n"
        ));
    }

    #[tokio::test]
    async fn dropped_guard_records_client_closed_request() {
        let metrics = ServiceMetrics::new().unwrap();
        let guard = CompletionGuard::new(metrics.clone(), "POST".to_string(), "/".to_string());
        drop(guard);

        assert!(
            metrics
                .export()
                .contains("requests_total{method=\"POST\",path=\"root\",status=\"499\"} 1\n")
        );
    }

    #[tokio::test]
    async fn guard_records_exactly_once_per_request() {
        let metrics = ServiceMetrics::new().unwrap();
        let router = test_router(&metrics);
        let _ = send(router.clone(), "/ping").await;
        let _ = send(router, "/ping").await;

        assert!(
            metrics
                .export()
                .contains("requests_total{method=\"GET\",path=\"/ping\",status=\"200\"} 2\n")
        );
    }
}
