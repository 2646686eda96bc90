//! The service's pre-registered instruments.
//!
//! Four instruments cover the whole pipeline:
//!
//! | name | kind | labels |
//! |------|------|--------|
//! | `requests_total` | Counter | `method`, `path`, `status` |
//! | `request_duration_seconds` | Histogram | `method`, `path`, `status` |
//! | `db_connections_active` | Gauge | (none) |
//! | `db_query_duration_seconds` | Histogram | `query_type` |
//!
//! [`ServiceMetrics`] is a cheap-to-clone handle wrapping the registry; its
//! typed record methods make label-arity mistakes impossible at call sites.

use std::sync::Arc;
use std::time::Duration;

use super::registry::{MetricDescriptor, MetricsError, Registry};

/// Default histogram bucket boundaries, in seconds.
///
/// Chosen to bracket both sub-millisecond in-process work and multi-second
/// degraded database round-trips. Declared here rather than relying on any
/// library default so the boundaries are part of the service's contract.
pub const DEFAULT_DURATION_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

const REQUESTS_TOTAL: &str = "requests_total";
const REQUEST_DURATION_SECONDS: &str = "request_duration_seconds";
const DB_CONNECTIONS_ACTIVE: &str = "db_connections_active";
const DB_QUERY_DURATION_SECONDS: &str = "db_query_duration_seconds";

/// Which logical database query a duration observation belongs to.
///
/// An enum rather than a free string so the `query_type` label cannot grow
/// unbounded cardinality.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryType {
    Insert,
    Select,
}

impl QueryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryType::Insert => "insert",
            QueryType::Select => "select",
        }
    }
}

/// Record the literal root path under `"root"`; every other path is recorded
/// verbatim. This only caps cardinality for the root case — dynamic path
/// segments are not collapsed, which is a documented limitation of the
/// current label scheme.
pub fn normalize_path(path: &str) -> &str {
    if path == "/" { "root" } else { path }
}

/// Handle over the registry with the four instruments pre-registered.
#[derive(Clone)]
pub struct ServiceMetrics {
    registry: Arc<Registry>,
}

impl ServiceMetrics {
    /// Build a fresh registry and register every instrument.
    ///
    /// # Errors
    ///
    /// Fails only on duplicate registration, which would be a programming
    /// error; callers treat it as fatal at startup.
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        registry.register(MetricDescriptor::counter(
            REQUESTS_TOTAL,
            "Total number of HTTP requests",
            &["method", "path", "status"],
        ))?;
        registry.register(MetricDescriptor::histogram(
            REQUEST_DURATION_SECONDS,
            "Duration of HTTP requests in seconds",
            &["method", "path", "status"],
            DEFAULT_DURATION_BUCKETS,
        ))?;
        registry.register(MetricDescriptor::gauge(
            DB_CONNECTIONS_ACTIVE,
            "Number of active database connections",
            &[],
        ))?;
        registry.register(MetricDescriptor::histogram(
            DB_QUERY_DURATION_SECONDS,
            "Duration of database queries in seconds",
            &["query_type"],
            DEFAULT_DURATION_BUCKETS,
        ))?;

        Ok(Self {
            registry: Arc::new(registry),
        })
    }

    /// Record one finalized request: increments `requests_total` and observes
    /// `request_duration_seconds` under the same label-set.
    pub fn record_request(
        &self,
        method: &str,
        path: &str,
        status: u16,
        duration: Duration,
    ) -> Result<(), MetricsError> {
        let path = normalize_path(path);
        let status = status.to_string();
        let labels = [method, path, status.as_str()];

        self.registry.record_counter(REQUESTS_TOTAL, &labels, 1.0)?;
        self.registry
            .observe_histogram(REQUEST_DURATION_SECONDS, &labels, duration.as_secs_f64())
    }

    /// Set the pool-occupancy gauge to the pool's current total connection
    /// count.
    pub fn set_db_connections(&self, count: u32) -> Result<(), MetricsError> {
        self.registry
            .record_gauge(DB_CONNECTIONS_ACTIVE, &[], f64::from(count))
    }

    /// Observe one database query duration, successful or not.
    pub fn observe_query_duration(
        &self,
        query_type: QueryType,
        duration: Duration,
    ) -> Result<(), MetricsError> {
        self.registry.observe_histogram(
            DB_QUERY_DURATION_SECONDS,
            &[query_type.as_str()],
            duration.as_secs_f64(),
        )
    }

    /// Render the registry in the exposition text format.
    pub fn export(&self) -> String {
        self.registry.export()
    }

    /// Shared registry handle, mainly for tests that assert on raw state.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_type_label_values() {
        assert_eq!(QueryType::Insert.as_str(), "insert");
        assert_eq!(QueryType::Select.as_str(), "select");
    }

    #[test]
    fn root_path_is_normalized_all_others_verbatim() {
        assert_eq!(normalize_path("/"), "root");
        assert_eq!(normalize_path("/healthz"), "/healthz");
        assert_eq!(normalize_path("/api/a/123"), "/api/a/123");
    }

    #[test]
    fn new_registers_all_four_instruments() {
        let metrics = ServiceMetrics::new().expect("instrument registration should succeed");
        let output = metrics.export();

        assert!(output.contains("# TYPE requests_total counter"));
        assert!(output.contains("# TYPE request_duration_seconds histogram"));
        assert!(output.contains("# TYPE db_connections_active gauge"));
        assert!(output.contains("# TYPE db_query_duration_seconds histogram"));
    }

    #[test]
    fn record_request_updates_counter_and_histogram_together() {
        let metrics = ServiceMetrics::new().unwrap();
        metrics
            .record_request("POST", "/", 200, Duration::from_millis(30))
            .unwrap();

        let output = metrics.export();
        assert!(
            output.contains("requests_total{method=\"POST\",path=\"root\",status=\"200\"} 1\n")
        );
        assert!(output.contains(
            "request_duration_seconds_count{method=\"POST\",path=\"root\",status=\"200\"} 1\n"
        ));
    }

    #[test]
    fn distinct_statuses_accumulate_separately() {
        let metrics = ServiceMetrics::new().unwrap();
        metrics
            .record_request("POST", "/", 200, Duration::from_millis(5))
            .unwrap();
        metrics
            .record_request("POST", "/", 500, Duration::from_millis(5))
            .unwrap();
        metrics
            .record_request("POST", "/", 500, Duration::from_millis(5))
            .unwrap();

        let output = metrics.export();
        assert!(
            output.contains("requests_total{method=\"POST\",path=\"root\",status=\"200\"} 1\n")
        );
        assert!(
            output.contains("requests_total{method=\"POST\",path=\"root\",status=\"500\"} 2\n")
        );
    }

    #[test]
    fn db_connections_gauge_is_last_write_wins() {
        let metrics = ServiceMetrics::new().unwrap();
        metrics.set_db_connections(3).unwrap();
        metrics.set_db_connections(2).unwrap();

        assert!(metrics.export().contains("db_connections_active 2\n"));
    }

    #[test]
    fn query_durations_count_once_per_observation() {
        let metrics = ServiceMetrics::new().unwrap();
        metrics
            .observe_query_duration(QueryType::Insert, Duration::from_millis(12))
            .unwrap();
        metrics
            .observe_query_duration(QueryType::Select, Duration::from_millis(3))
            .unwrap();
        metrics
            .observe_query_duration(QueryType::Insert, Duration::from_millis(8))
            .unwrap();

        let output = metrics.export();
        assert!(
            output.contains("db_query_duration_seconds_count{query_type=\"insert\"} 2\n")
        );
        assert!(
            output.contains("db_query_duration_seconds_count{query_type=\"select\"} 1\n")
        );
    }

    #[test]
    fn handles_are_clones_of_one_registry() {
        let metrics = ServiceMetrics::new().unwrap();
        let clone = metrics.clone();

        metrics
            .record_request("GET", "/metrics", 200, Duration::from_millis(1))
            .unwrap();

        assert!(clone.export().contains("path=\"/metrics\""));
    }
}
