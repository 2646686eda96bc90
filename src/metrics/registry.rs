//! Time-series metric registry with Prometheus text exposition.
//!
//! The registry owns every instrument the service records into. Metrics are
//! declared up front as [`MetricDescriptor`]s and mutated only through the
//! typed entry points (`record_counter`, `record_gauge`, `observe_histogram`);
//! samples themselves are never handed out. [`Registry::export`] renders the
//! current state in the Prometheus text format with a stable, total ordering:
//! metrics in registration order, samples in lexicographic label-value order.
//!
//! All sample cells are atomics, so recording is lock-free on the hot path
//! (a read lock on the sample table plus a CAS) and safe under unbounded
//! concurrent writers. A new label-set takes the table's write lock exactly
//! once to insert its cells.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;

/// Content type served by the exposition endpoint.
pub const TEXT_FORMAT: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Errors produced by instrument registration and recording.
///
/// These indicate instrument misuse, not runtime conditions: registration
/// failures are fatal at startup, and recording failures are logged at error
/// level by callers rather than swallowed.
#[derive(Debug, Error, PartialEq)]
pub enum MetricsError {
    #[error("metric `{0}` is already registered")]
    DuplicateMetricName(String),

    #[error("metric `{0}` was never registered")]
    UnknownMetric(String),

    #[error("metric `{metric}` takes {expected} label value(s), got {got}")]
    LabelArityMismatch {
        metric: String,
        expected: usize,
        got: usize,
    },

    #[error("metric `{metric}` is a {actual}, not a {expected}")]
    KindMismatch {
        metric: String,
        expected: MetricKind,
        actual: MetricKind,
    },

    #[error("invalid value {value} for metric `{metric}`: {reason}")]
    InvalidValue {
        metric: String,
        value: f64,
        reason: &'static str,
    },
}

/// The three instrument kinds the registry supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    /// Monotonically non-decreasing per label-set.
    Counter,
    /// Last-write-wins per label-set.
    Gauge,
    /// Fixed bucket boundaries plus running sum/count per label-set.
    Histogram,
}

impl MetricKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
            MetricKind::Histogram => "histogram",
        }
    }
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable description of one metric: name, help text, kind, and the
/// ordered label names every recording call must match in arity.
#[derive(Debug, Clone)]
pub struct MetricDescriptor {
    name: String,
    help: String,
    kind: MetricKind,
    labels: Vec<String>,
    /// Histogram bucket upper bounds, sorted ascending. Empty for other kinds.
    buckets: Vec<f64>,
}

impl MetricDescriptor {
    pub fn counter(name: &str, help: &str, labels: &[&str]) -> Self {
        Self::new(name, help, MetricKind::Counter, labels, &[])
    }

    pub fn gauge(name: &str, help: &str, labels: &[&str]) -> Self {
        Self::new(name, help, MetricKind::Gauge, labels, &[])
    }

    /// Bucket boundaries are explicit at registration time; there are no
    /// library-implicit defaults.
    pub fn histogram(name: &str, help: &str, labels: &[&str], buckets: &[f64]) -> Self {
        Self::new(name, help, MetricKind::Histogram, labels, buckets)
    }

    fn new(name: &str, help: &str, kind: MetricKind, labels: &[&str], buckets: &[f64]) -> Self {
        let mut buckets: Vec<f64> = buckets.iter().copied().filter(|b| b.is_finite()).collect();
        buckets.sort_by(|a, b| a.total_cmp(b));
        buckets.dedup();

        Self {
            name: name.to_string(),
            help: help.to_string(),
            kind,
            labels: labels.iter().map(|l| l.to_string()).collect(),
            buckets,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> MetricKind {
        self.kind
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn buckets(&self) -> &[f64] {
        &self.buckets
    }
}

/// An f64 cell updated through `AtomicU64` bit patterns. `add` is a CAS loop,
/// so concurrent increments to the same cell never lose updates.
#[derive(Debug, Default)]
struct AtomicF64(AtomicU64);

impl AtomicF64 {
    fn get(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Relaxed))
    }

    fn set(&self, value: f64) {
        self.0.store(value.to_bits(), Ordering::Relaxed);
    }

    fn add(&self, delta: f64) {
        let mut current = self.0.load(Ordering::Relaxed);
        loop {
            let next = (f64::from_bits(current) + delta).to_bits();
            match self
                .0
                .compare_exchange_weak(current, next, Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(_) => return,
                Err(actual) => current = actual,
            }
        }
    }
}

#[derive(Debug)]
struct HistogramCells {
    /// One counter per configured boundary; an observation lands in the
    /// first bucket whose upper bound is >= the value. Cumulative counts are
    /// computed at export time.
    buckets: Vec<AtomicU64>,
    sum: AtomicF64,
    count: AtomicU64,
}

#[derive(Debug)]
enum Sample {
    Value(AtomicF64),
    Histogram(HistogramCells),
}

struct Metric {
    descriptor: MetricDescriptor,
    samples: RwLock<BTreeMap<Vec<String>, Arc<Sample>>>,
}

impl Metric {
    fn new(descriptor: MetricDescriptor) -> Self {
        Self {
            descriptor,
            samples: RwLock::new(BTreeMap::new()),
        }
    }

    /// Fetch the sample for a label-set, creating it lazily on first use.
    /// Once created, a label-set's sample lives for the process lifetime.
    fn sample(&self, label_values: &[&str]) -> Arc<Sample> {
        let key: Vec<String> = label_values.iter().map(|v| v.to_string()).collect();

        {
            let samples = self.samples.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(sample) = samples.get(&key) {
                return Arc::clone(sample);
            }
        }

        let mut samples = self.samples.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(samples.entry(key).or_insert_with(|| {
            Arc::new(match self.descriptor.kind {
                MetricKind::Counter | MetricKind::Gauge => Sample::Value(AtomicF64::default()),
                MetricKind::Histogram => Sample::Histogram(HistogramCells {
                    buckets: self
                        .descriptor
                        .buckets
                        .iter()
                        .map(|_| AtomicU64::new(0))
                        .collect(),
                    sum: AtomicF64::default(),
                    count: AtomicU64::new(0),
                }),
            })
        }))
    }
}

#[derive(Default)]
struct Inner {
    /// Registration order; export iterates this.
    metrics: Vec<Arc<Metric>>,
    index: HashMap<String, usize>,
}

/// Explicitly constructed, singly-owned instrument collection. Components
/// that record or export metrics hold a shared handle rather than reaching
/// for ambient global state, so tests inject a fresh registry each.
#[derive(Default)]
pub struct Registry {
    inner: RwLock<Inner>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a descriptor with zero samples.
    pub fn register(&self, descriptor: MetricDescriptor) -> Result<(), MetricsError> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if inner.index.contains_key(descriptor.name()) {
            return Err(MetricsError::DuplicateMetricName(
                descriptor.name().to_string(),
            ));
        }

        let name = descriptor.name().to_string();
        let slot = inner.metrics.len();
        inner.metrics.push(Arc::new(Metric::new(descriptor)));
        inner.index.insert(name, slot);
        Ok(())
    }

    /// Add `delta` (which must be finite and non-negative) to a counter
    /// label-set.
    pub fn record_counter(
        &self,
        name: &str,
        label_values: &[&str],
        delta: f64,
    ) -> Result<(), MetricsError> {
        if !delta.is_finite() || delta < 0.0 {
            return Err(MetricsError::InvalidValue {
                metric: name.to_string(),
                value: delta,
                reason: "counter deltas must be finite and non-negative",
            });
        }

        let metric = self.metric(name, label_values, MetricKind::Counter)?;
        match metric.sample(label_values).as_ref() {
            Sample::Value(cell) => cell.add(delta),
            Sample::Histogram(_) => unreachable!("counter sample is always a value cell"),
        }
        Ok(())
    }

    /// Set a gauge label-set to `value` (last write wins).
    pub fn record_gauge(
        &self,
        name: &str,
        label_values: &[&str],
        value: f64,
    ) -> Result<(), MetricsError> {
        if !value.is_finite() {
            return Err(MetricsError::InvalidValue {
                metric: name.to_string(),
                value,
                reason: "gauge values must be finite",
            });
        }

        let metric = self.metric(name, label_values, MetricKind::Gauge)?;
        match metric.sample(label_values).as_ref() {
            Sample::Value(cell) => cell.set(value),
            Sample::Histogram(_) => unreachable!("gauge sample is always a value cell"),
        }
        Ok(())
    }

    /// Record one observation into a histogram label-set.
    pub fn observe_histogram(
        &self,
        name: &str,
        label_values: &[&str],
        value: f64,
    ) -> Result<(), MetricsError> {
        // NaN and infinity would corrupt every percentile computed from the
        // histogram; negative values are meaningless for the durations these
        // histograms carry.
        if !value.is_finite() || value < 0.0 {
            return Err(MetricsError::InvalidValue {
                metric: name.to_string(),
                value,
                reason: "histogram observations must be finite and non-negative",
            });
        }

        let metric = self.metric(name, label_values, MetricKind::Histogram)?;
        match metric.sample(label_values).as_ref() {
            Sample::Histogram(cells) => {
                let slot = metric.descriptor.buckets.partition_point(|b| value > *b);
                if let Some(bucket) = cells.buckets.get(slot) {
                    bucket.fetch_add(1, Ordering::Relaxed);
                }
                cells.sum.add(value);
                cells.count.fetch_add(1, Ordering::Relaxed);
            }
            Sample::Value(_) => unreachable!("histogram sample is always histogram cells"),
        }
        Ok(())
    }

    /// Render every registered metric in the Prometheus text format.
    ///
    /// Metrics appear in registration order; within a metric, samples appear
    /// in lexicographic label-value order (the sample tables are BTreeMaps,
    /// so this falls out of iteration). Calling `export` twice with no
    /// intervening writes yields byte-identical output, and the method is
    /// read-only and safe to call concurrently with writers.
    pub fn export(&self) -> String {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let mut out = String::new();

        for metric in &inner.metrics {
            let d = &metric.descriptor;
            out.push_str(&format!("# HELP {} {}\n", d.name, escape_help(&d.help)));
            out.push_str(&format!("# TYPE {} {}\n", d.name, d.kind.as_str()));

            let samples = metric.samples.read().unwrap_or_else(PoisonError::into_inner);
            for (label_values, sample) in samples.iter() {
                match sample.as_ref() {
                    Sample::Value(cell) => {
                        out.push_str(&format!(
                            "{}{} {}\n",
                            d.name,
                            render_labels(&d.labels, label_values, None),
                            format_value(cell.get()),
                        ));
                    }
                    Sample::Histogram(cells) => {
                        let mut cumulative = 0u64;
                        for (boundary, bucket) in d.buckets.iter().zip(&cells.buckets) {
                            cumulative += bucket.load(Ordering::Relaxed);
                            out.push_str(&format!(
                                "{}_bucket{} {}\n",
                                d.name,
                                render_labels(
                                    &d.labels,
                                    label_values,
                                    Some(("le", &format_value(*boundary))),
                                ),
                                cumulative,
                            ));
                        }
                        let count = cells.count.load(Ordering::Relaxed);
                        out.push_str(&format!(
                            "{}_bucket{} {}\n",
                            d.name,
                            render_labels(&d.labels, label_values, Some(("le", "+Inf"))),
                            count,
                        ));
                        out.push_str(&format!(
                            "{}_sum{} {}\n",
                            d.name,
                            render_labels(&d.labels, label_values, None),
                            format_value(cells.sum.get()),
                        ));
                        out.push_str(&format!(
                            "{}_count{} {}\n",
                            d.name,
                            render_labels(&d.labels, label_values, None),
                            count,
                        ));
                    }
                }
            }
        }

        out
    }

    /// Look up a metric by name, checking kind and label arity.
    fn metric(
        &self,
        name: &str,
        label_values: &[&str],
        expected: MetricKind,
    ) -> Result<Arc<Metric>, MetricsError> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let slot = *inner
            .index
            .get(name)
            .ok_or_else(|| MetricsError::UnknownMetric(name.to_string()))?;
        let metric = Arc::clone(&inner.metrics[slot]);

        if metric.descriptor.kind != expected {
            return Err(MetricsError::KindMismatch {
                metric: name.to_string(),
                expected,
                actual: metric.descriptor.kind,
            });
        }
        if metric.descriptor.labels.len() != label_values.len() {
            return Err(MetricsError::LabelArityMismatch {
                metric: name.to_string(),
                expected: metric.descriptor.labels.len(),
                got: label_values.len(),
            });
        }
        Ok(metric)
    }
}

fn render_labels(
    names: &[String],
    values: &[String],
    extra: Option<(&str, &str)>,
) -> String {
    if names.is_empty() && extra.is_none() {
        return String::new();
    }

    let mut parts: Vec<String> = names
        .iter()
        .zip(values)
        .map(|(name, value)| format!("{name}=\"{}\"", escape_label_value(value)))
        .collect();
    if let Some((name, value)) = extra {
        parts.push(format!("{name}=\"{value}\""));
    }
    format!("{{{}}}", parts.join(","))
}

/// Label values are recorded verbatim (e.g. request paths), so quoting and
/// newlines must be escaped per the text-format rules.
fn escape_label_value(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

fn escape_help(help: &str) -> String {
    help.replace('\\', "\\\\").replace('\n', "\\n")
}

/// Integral values render without a fractional part so counter lines read as
/// whole numbers; boundaries like 0.005 keep their shortest f64 form.
fn format_value(value: f64) -> String {
    if value == f64::INFINITY {
        "+Inf".to_string()
    } else if value == f64::NEG_INFINITY {
        "-Inf".to_string()
    } else if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}
