// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Postgres store of record.
//!
//! Every statement runs through the shared retry schedule, retrying only
//! what [`classifier::classify`] marks retriable. Upserts carry a kind guard,
//! so a row that exists under the other kind is left untouched and reported
//! as a conflict. Batches run in one transaction, retried as a unit.
//!
//! The table is created on the first probe that reaches the database, so a
//! server started before Postgres still gets its schema once it answers.

pub mod classifier;

use crate::errors::{DbError, StoreError};
use crate::store::{check_batch_kinds, validate_all, DurableBackend, MetricStore};
use async_trait::async_trait;
use metrics_model::retry::{retry, Backoff};
use metrics_model::{Metric, MetricKind, MetricRecord, MetricValue};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Executor, Postgres};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS metrics (
    id VARCHAR(255) PRIMARY KEY,
    mtype VARCHAR(16) NOT NULL,
    value DOUBLE PRECISION,
    delta BIGINT
)
"#;

const UPSERT_GAUGE: &str = r#"
INSERT INTO metrics (id, mtype, value, delta) VALUES ($1, 'gauge', $2, NULL)
ON CONFLICT (id) DO UPDATE SET value = EXCLUDED.value
WHERE metrics.mtype = EXCLUDED.mtype
"#;

const UPSERT_COUNTER: &str = r#"
INSERT INTO metrics (id, mtype, value, delta) VALUES ($1, 'counter', NULL, $2)
ON CONFLICT (id) DO UPDATE SET delta = metrics.delta + EXCLUDED.delta
WHERE metrics.mtype = EXCLUDED.mtype
"#;

const SELECT_GAUGE: &str = "SELECT value FROM metrics WHERE id = $1 AND mtype = 'gauge'";
const SELECT_COUNTER: &str = "SELECT delta FROM metrics WHERE id = $1 AND mtype = 'counter'";
const SELECT_ALL: &str = "SELECT id, mtype, value, delta FROM metrics ORDER BY id";

/// Returns the number of rows written; zero means the kind guard refused.
async fn upsert<'e, E>(executor: E, metric: &Metric) -> Result<u64, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let done = match metric.value {
        MetricValue::Gauge(v) => {
            sqlx::query(UPSERT_GAUGE)
                .bind(metric.name.as_str())
                .bind(v)
                .execute(executor)
                .await?
        }
        MetricValue::Counter(d) => {
            sqlx::query(UPSERT_COUNTER)
                .bind(metric.name.as_str())
                .bind(d)
                .execute(executor)
                .await?
        }
    };
    Ok(done.rows_affected())
}

fn conflict(metric: &Metric) -> StoreError {
    StoreError::KindConflict {
        name: metric.name.clone(),
        requested: metric.kind(),
    }
}

#[derive(Debug, Clone)]
pub struct PostgresBackend {
    pool: PgPool,
    backoff: Backoff,
    probe_timeout: Duration,
    cancel: CancellationToken,
    schema: Arc<OnceCell<()>>,
}

impl PostgresBackend {
    /// Builds the pool without connecting; connections open on first use.
    /// Waiting for a connection is bounded by `probe_timeout`, so one failed
    /// attempt against a dead server costs at most that long.
    pub fn connect_lazy(
        dsn: &str,
        max_connections: u32,
        probe_timeout: Duration,
        cancel: CancellationToken,
    ) -> Result<Self, DbError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(probe_timeout)
            .connect_lazy(dsn)?;
        Ok(Self::from_pool(pool, probe_timeout, cancel))
    }

    pub fn from_pool(pool: PgPool, probe_timeout: Duration, cancel: CancellationToken) -> Self {
        Self {
            pool,
            backoff: Backoff::default(),
            probe_timeout,
            cancel,
            schema: Arc::new(OnceCell::new()),
        }
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Creates the metrics table once per backend; later calls return
    /// immediately.
    pub async fn bootstrap_schema(&self) -> Result<(), DbError> {
        self.schema
            .get_or_try_init(|| async {
                retry(&self.backoff, &self.cancel, classifier::is_retriable, |_| {
                    sqlx::query(SCHEMA).execute(&self.pool)
                })
                .await?;
                info!("Metrics table ready");
                Ok::<(), DbError>(())
            })
            .await?;
        Ok(())
    }

    pub fn schema_ready(&self) -> bool {
        self.schema.initialized()
    }

    async fn ensure_schema(&self) -> bool {
        if self.schema_ready() {
            return true;
        }
        match self.bootstrap_schema().await {
            Ok(()) => true,
            Err(e) => {
                warn!("Unable to create metrics table: {e}");
                false
            }
        }
    }

    async fn upsert_one(&self, metric: Metric) -> Result<(), StoreError> {
        metric.validate()?;
        let written = retry(&self.backoff, &self.cancel, classifier::is_retriable, |_| {
            upsert(&self.pool, &metric)
        })
        .await
        .map_err(DbError::from)?;

        if written == 0 {
            return Err(conflict(&metric));
        }
        Ok(())
    }

    /// Runs one attempt of a batch transaction. Returns the index of the
    /// first metric refused by the kind guard, after rolling back.
    async fn apply_batch_once(&self, metrics: &[Metric]) -> Result<Option<usize>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        for (idx, metric) in metrics.iter().enumerate() {
            // An error drops `tx`, which rolls it back.
            if upsert(&mut *tx, metric).await? == 0 {
                tx.rollback().await?;
                return Ok(Some(idx));
            }
        }
        tx.commit().await?;
        Ok(None)
    }
}

#[async_trait]
impl MetricStore for PostgresBackend {
    async fn update_gauge(&self, name: &str, value: f64) -> Result<(), StoreError> {
        self.upsert_one(Metric::gauge(name, value)).await
    }

    async fn update_counter(&self, name: &str, delta: i64) -> Result<(), StoreError> {
        self.upsert_one(Metric::counter(name, delta)).await
    }

    async fn update_batch(&self, metrics: &[Metric]) -> Result<(), StoreError> {
        if metrics.is_empty() {
            return Ok(());
        }
        validate_all(metrics)?;
        check_batch_kinds(metrics)?;

        let refused = retry(&self.backoff, &self.cancel, classifier::is_retriable, |_| {
            self.apply_batch_once(metrics)
        })
        .await
        .map_err(DbError::from)?;

        match refused.and_then(|idx| metrics.get(idx)) {
            Some(metric) => {
                warn!("Rolled back batch of {}: {}", metrics.len(), conflict(metric));
                Err(conflict(metric))
            }
            None => {
                debug!("Committed batch of {} metrics", metrics.len());
                Ok(())
            }
        }
    }

    async fn read_gauge(&self, name: &str) -> Result<f64, StoreError> {
        let row: Option<Option<f64>> =
            retry(&self.backoff, &self.cancel, classifier::is_retriable, |_| {
                sqlx::query_scalar(SELECT_GAUGE)
                    .bind(name)
                    .fetch_optional(&self.pool)
            })
            .await
            .map_err(DbError::from)?;

        row.flatten().ok_or_else(|| StoreError::NotFound {
            kind: MetricKind::Gauge,
            name: name.to_string(),
        })
    }

    async fn read_counter(&self, name: &str) -> Result<i64, StoreError> {
        let row: Option<Option<i64>> =
            retry(&self.backoff, &self.cancel, classifier::is_retriable, |_| {
                sqlx::query_scalar(SELECT_COUNTER)
                    .bind(name)
                    .fetch_optional(&self.pool)
            })
            .await
            .map_err(DbError::from)?;

        row.flatten().ok_or_else(|| StoreError::NotFound {
            kind: MetricKind::Counter,
            name: name.to_string(),
        })
    }

    async fn read_all(&self) -> Result<Vec<Metric>, StoreError> {
        let rows: Vec<(String, String, Option<f64>, Option<i64>)> =
            retry(&self.backoff, &self.cancel, classifier::is_retriable, |_| {
                sqlx::query_as(SELECT_ALL).fetch_all(&self.pool)
            })
            .await
            .map_err(DbError::from)?;

        rows.into_iter()
            .map(|(id, mtype, value, delta)| {
                let record = MetricRecord {
                    id,
                    kind: mtype.parse()?,
                    delta,
                    value,
                };
                Ok(Metric::try_from(record)?)
            })
            .collect()
    }
}

#[async_trait]
impl DurableBackend for PostgresBackend {
    /// Reachable means the database answered and the metrics table exists.
    async fn ping(&self) -> bool {
        let probe = sqlx::query("SELECT 1").execute(&self.pool);
        let answered = match tokio::time::timeout(self.probe_timeout, probe).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                debug!("Database probe failed: {e}");
                false
            }
            Err(_) => {
                debug!(
                    "Database probe timed out after {} ms",
                    self.probe_timeout.as_millis()
                );
                false
            }
        };
        answered && self.ensure_schema().await
    }
}
