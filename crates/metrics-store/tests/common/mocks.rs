// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Mock durable backend for testing the ingestion service

use async_trait::async_trait;
use metrics_model::Metric;
use metrics_store::errors::DbError;
use metrics_store::{DurableBackend, MemStorage, MetricStore, StoreError};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Durable backend backed by an in-memory table, with a switchable probe
/// and an optional write failure.
pub struct MockDurable {
    pub rows: MemStorage,
    reachable: AtomicBool,
    fail_writes: AtomicBool,
    pub probes: AtomicUsize,
    pub writes: AtomicUsize,
}

#[allow(dead_code)]
impl MockDurable {
    pub fn reachable() -> Self {
        Self {
            rows: MemStorage::in_memory(),
            reachable: AtomicBool::new(true),
            fail_writes: AtomicBool::new(false),
            probes: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
        }
    }

    pub fn unreachable() -> Self {
        let mock = Self::reachable();
        mock.set_reachable(false);
        mock
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    pub fn fail_writes(&self) {
        self.fail_writes.store(true, Ordering::SeqCst);
    }

    fn write(&self) -> Result<(), StoreError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Database(DbError::Exhausted {
                attempts: 4,
                source: sqlx::Error::PoolTimedOut,
            }));
        }
        Ok(())
    }
}

#[async_trait]
impl MetricStore for MockDurable {
    async fn update_gauge(&self, name: &str, value: f64) -> Result<(), StoreError> {
        self.write()?;
        self.rows.update_gauge(name, value).await
    }

    async fn update_counter(&self, name: &str, delta: i64) -> Result<(), StoreError> {
        self.write()?;
        self.rows.update_counter(name, delta).await
    }

    async fn update_batch(&self, metrics: &[Metric]) -> Result<(), StoreError> {
        self.write()?;
        self.rows.update_batch(metrics).await
    }

    async fn read_gauge(&self, name: &str) -> Result<f64, StoreError> {
        self.rows.read_gauge(name).await
    }

    async fn read_counter(&self, name: &str) -> Result<i64, StoreError> {
        self.rows.read_counter(name).await
    }

    async fn read_all(&self) -> Result<Vec<Metric>, StoreError> {
        self.rows.read_all().await
    }
}

#[async_trait]
impl DurableBackend for MockDurable {
    async fn ping(&self) -> bool {
        self.probes.fetch_add(1, Ordering::SeqCst);
        self.reachable.load(Ordering::SeqCst)
    }
}
