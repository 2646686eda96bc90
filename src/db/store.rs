//! Persistence for ingested requests.
//!
//! [`RequestStore`] owns the pool and issues the two queries the service
//! needs: a record insert and the newest-first read-back. Every query runs
//! through the timed wrapper, which observes `db_query_duration_seconds`
//! whether the query succeeded or failed and only then propagates the error.

use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;

use crate::metrics::{QueryType, ServiceMetrics};

/// One persisted request, as returned by the read-back query.
///
/// Written exactly once per ingested request and never mutated; `ts` is
/// assigned by the store at insert time. The attachment blob stays in the
/// database — read-backs only carry the metadata columns.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct RequestRecord {
    pub id: i64,
    pub backend_name: String,
    pub ts: DateTime<Utc>,
    pub meta: serde_json::Value,
}

/// Pool handle plus the identity recorded with every insert.
#[derive(Clone)]
pub struct RequestStore {
    pool: PgPool,
    metrics: ServiceMetrics,
    backend: String,
}

impl RequestStore {
    pub fn new(pool: PgPool, metrics: ServiceMetrics, backend: impl Into<String>) -> Self {
        Self {
            pool,
            metrics,
            backend: backend.into(),
        }
    }

    /// The backend identity written with every record.
    pub fn backend(&self) -> &str {
        &self.backend
    }

    /// Persist one request record with its optional attachment.
    pub async fn insert_request(
        &self,
        uploaded: bool,
        image: Option<&[u8]>,
    ) -> Result<(), sqlx::Error> {
        let meta = serde_json::json!({ "uploaded": uploaded });

        self.timed(
            QueryType::Insert,
            sqlx::query(
                "INSERT INTO requests (backend_name, meta, image) \
                 VALUES ($1, $2, $3)",
            )
            .bind(&self.backend)
            .bind(meta)
            .bind(image)
            .execute(&self.pool),
        )
        .await
        .map(|_| ())
    }

    /// Fetch the `limit` most recent records, newest first.
    pub async fn recent_requests(&self, limit: i64) -> Result<Vec<RequestRecord>, sqlx::Error> {
        self.timed(
            QueryType::Select,
            sqlx::query_as::<_, RequestRecord>(
                "SELECT id, backend_name, ts, meta FROM requests \
                 ORDER BY ts DESC LIMIT $1",
            )
            .bind(limit)
            .fetch_all(&self.pool),
        )
        .await
    }

    /// Run a query future and observe its duration under `query_type`,
    /// regardless of outcome. The observation lands before any error
    /// propagates, so failed attempts are counted exactly like successes.
    async fn timed<T, F>(&self, query_type: QueryType, op: F) -> Result<T, sqlx::Error>
    where
        F: Future<Output = Result<T, sqlx::Error>>,
    {
        let start = Instant::now();
        let result = op.await;

        if let Err(error) = self
            .metrics
            .observe_query_duration(query_type, start.elapsed())
        {
            tracing::error!(%error, query_type = query_type.as_str(), "failed to record query duration");
        }

        result
    }
}
