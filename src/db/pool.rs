//! Postgres connection pool construction and occupancy tracking.
//!
//! The pool connects lazily: no connection is attempted until the first
//! query, so startup never blocks on database availability and the health
//! endpoints stay useful while the store is down.
//!
//! [`PoolWatcher`] is the occupancy adapter: it subscribes once to the
//! pool's lifecycle hooks and re-samples the total connection count into the
//! `db_connections_active` gauge. It intercepts nothing else — query timing
//! lives with the store, not the pool.

use std::sync::{Arc, OnceLock};

use sqlx::PgPool;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgSslMode};

use crate::config::DatabaseConfig;
use crate::metrics::ServiceMetrics;

/// Samples pool occupancy into the gauge on connection lifecycle events.
///
/// Holds no per-connection state: just the metrics handle and a slot for the
/// pool, filled once after construction (the hooks are installed before the
/// pool exists, so the handle arrives via [`PoolWatcher::attach`]).
pub struct PoolWatcher {
    metrics: ServiceMetrics,
    pool: OnceLock<PgPool>,
}

impl PoolWatcher {
    fn new(metrics: ServiceMetrics) -> Self {
        Self {
            metrics,
            pool: OnceLock::new(),
        }
    }

    fn attach(&self, pool: &PgPool) {
        let _ = self.pool.set(pool.clone());
        self.sample();
    }

    /// Read the pool's current total connection count into the gauge.
    ///
    /// No-op until [`PoolWatcher::attach`] has run. sqlx offers no
    /// connection-close callback, so this fires on `after_connect` and
    /// `after_release`; a closed connection becomes visible in the gauge at
    /// the next lifecycle event.
    pub fn sample(&self) {
        if let Some(pool) = self.pool.get() {
            if let Err(error) = self.metrics.set_db_connections(pool.size()) {
                tracing::error!(%error, "failed to record pool occupancy");
            }
        }
    }
}

/// Build the service pool from configuration.
pub fn connect(config: &DatabaseConfig, metrics: &ServiceMetrics) -> PgPool {
    let options = PgConnectOptions::new()
        .host(&config.host)
        .port(config.port)
        .username(&config.user)
        .password(&config.password)
        .database(&config.database)
        // The store is only reachable over an encrypted connection; `require`
        // encrypts without verifying the server certificate, matching the
        // deployment's relaxed-verification TLS setup.
        .ssl_mode(PgSslMode::Require);

    connect_with(options, config.max_connections, metrics)
}

/// Build a lazily-connecting pool with the occupancy watcher installed.
///
/// Exposed separately from [`connect`] so callers holding a connection URL
/// (e.g. integration tests using `DATABASE_URL`) get the same instrumented
/// pool.
pub fn connect_with(
    options: PgConnectOptions,
    max_connections: u32,
    metrics: &ServiceMetrics,
) -> PgPool {
    let watcher = Arc::new(PoolWatcher::new(metrics.clone()));

    let on_connect = Arc::clone(&watcher);
    let on_release = Arc::clone(&watcher);
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .after_connect(move |_conn, _meta| {
            let watcher = Arc::clone(&on_connect);
            Box::pin(async move {
                watcher.sample();
                Ok(())
            })
        })
        .after_release(move |_conn, _meta| {
            let watcher = Arc::clone(&on_release);
            Box::pin(async move {
                watcher.sample();
                Ok(true)
            })
        })
        .connect_lazy_with(options);

    watcher.attach(&pool);
    pool
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dead_end_options() -> PgConnectOptions {
        // Port 1 refuses connections; the lazy pool never dials it unless a
        // query runs.
        PgConnectOptions::new()
            .host("127.0.0.1")
            .port(1)
            .username("nobody")
            .database("nothing")
            .ssl_mode(PgSslMode::Disable)
    }

    #[tokio::test]
    async fn lazy_pool_construction_does_not_connect() {
        let metrics = ServiceMetrics::new().unwrap();
        let pool = connect_with(dead_end_options(), 4, &metrics);
        assert_eq!(pool.size(), 0);
    }

    #[tokio::test]
    async fn watcher_attach_publishes_initial_occupancy() {
        let metrics = ServiceMetrics::new().unwrap();
        let _pool = connect_with(dead_end_options(), 4, &metrics);

        assert!(metrics.export().contains("db_connections_active 0\n"));
    }

    #[test]
    fn unattached_watcher_sample_is_a_no_op() {
        let metrics = ServiceMetrics::new().unwrap();
        let watcher = PoolWatcher::new(metrics.clone());
        watcher.sample();

        // Gauge has no sample yet: nothing was recorded.
        assert!(!metrics.export().contains("db_connections_active 0\n"));
    }
}
