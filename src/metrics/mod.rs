//! Metrics collection for the ingestion pipeline.
//!
//! [`registry`] holds the generic instrument registry and exposition format;
//! [`instruments`] defines the four instruments this service records into.
//! Metrics are exposed via the `/metrics` endpoint in Prometheus text format.

mod instruments;
mod registry;

pub use instruments::{
    DEFAULT_DURATION_BUCKETS, QueryType, ServiceMetrics, normalize_path,
};
pub use registry::{MetricDescriptor, MetricKind, MetricsError, Registry, TEXT_FORMAT};
