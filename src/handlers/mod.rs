//! HTTP request handlers for the intake API

use crate::config::Config;
use crate::db::{self, RequestStore};
use crate::error::AppResult;
use crate::metrics::ServiceMetrics;
use std::sync::Arc;

pub mod health;
pub mod ingest;
pub mod metrics;

/// Application state shared across all handlers
///
/// Holds the configuration, the metrics handle, and the request store.
/// Cloning is cheap: every field is either an Arc or wraps one.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    metrics: ServiceMetrics,
    store: RequestStore,
}

impl AppState {
    /// Create a new AppState from configuration.
    ///
    /// Registers the instrument set and builds the (lazily-connecting)
    /// database pool; no I/O happens here.
    ///
    /// # Errors
    ///
    /// Fails if instrument registration fails, which indicates a programming
    /// error and is fatal at startup.
    pub fn new(config: Arc<Config>) -> AppResult<Self> {
        let metrics = ServiceMetrics::new()?;
        let pool = db::connect(&config.database, &metrics);
        let store = RequestStore::new(
            pool,
            metrics.clone(),
            config.server.backend_name.clone(),
        );

        Ok(Self {
            config,
            metrics,
            store,
        })
    }

    /// Assemble state from pre-built parts (used by tests that bring their
    /// own pool, e.g. one pointed at `DATABASE_URL`).
    pub fn from_parts(config: Arc<Config>, metrics: ServiceMetrics, store: RequestStore) -> Self {
        Self {
            config,
            metrics,
            store,
        }
    }

    /// Get reference to the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get reference to the metrics handle
    pub fn metrics(&self) -> &ServiceMetrics {
        &self.metrics
    }

    /// Get reference to the request store
    pub fn store(&self) -> &RequestStore {
        &self.store
    }
}
