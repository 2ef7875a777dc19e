// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! In-process metric storage with an optional JSON snapshot file.
//!
//! In sync mode every mutation rewrites the snapshot before returning. In
//! interval mode [`MemStorage::run_snapshot_loop`] rewrites it on a timer and
//! once more at shutdown. The table is serialized under its lock and written
//! outside it; a generation counter keeps an older snapshot from replacing a
//! newer one when writers race.

use crate::config::{SnapshotMode, StoreConfig};
use crate::errors::{SnapshotError, StoreError};
use crate::store::{check_batch_kinds, validate_all, MetricStore};
use async_trait::async_trait;
use metrics_model::{Metric, MetricKind, MetricRecord, MetricValue};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Debug, Default, Clone, PartialEq)]
struct Tables {
    gauges: HashMap<String, f64>,
    counters: HashMap<String, i64>,
}

impl Tables {
    fn conflicts(&self, metric: &Metric) -> bool {
        match metric.value {
            MetricValue::Gauge(_) => self.counters.contains_key(&metric.name),
            MetricValue::Counter(_) => self.gauges.contains_key(&metric.name),
        }
    }

    fn apply(&mut self, metric: &Metric) {
        match metric.value {
            MetricValue::Gauge(v) => {
                self.gauges.insert(metric.name.clone(), v);
            }
            MetricValue::Counter(d) => {
                let total = self.counters.entry(metric.name.clone()).or_insert(0);
                *total = total.saturating_add(d);
            }
        }
    }

    fn records(&self) -> Vec<MetricRecord> {
        let mut records: Vec<MetricRecord> = self
            .gauges
            .iter()
            .map(|(name, v)| MetricRecord::from(Metric::gauge(name.as_str(), *v)))
            .chain(
                self.counters
                    .iter()
                    .map(|(name, d)| MetricRecord::from(Metric::counter(name.as_str(), *d))),
            )
            .collect();
        records.sort_by(|a, b| a.id.cmp(&b.id));
        records
    }
}

#[derive(Debug)]
struct Snapshot {
    path: PathBuf,
    generation: AtomicU64,
    // Generation of the last snapshot on disk.
    written: tokio::sync::Mutex<u64>,
}

impl Snapshot {
    fn temp_path(&self) -> PathBuf {
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        PathBuf::from(tmp)
    }

    async fn write(&self, generation: u64, body: Vec<u8>) -> Result<(), SnapshotError> {
        let mut written = self.written.lock().await;
        if *written >= generation {
            debug!("Skipping stale snapshot generation {generation}");
            return Ok(());
        }

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let tmp = self.temp_path();
        tokio::fs::write(&tmp, &body).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        *written = generation;
        debug!(
            "Wrote snapshot generation {generation} ({} bytes) to {}",
            body.len(),
            self.path.display()
        );
        Ok(())
    }
}

#[derive(Debug)]
pub struct MemStorage {
    tables: Mutex<Tables>,
    snapshot: Option<Snapshot>,
    sync: bool,
}

impl Default for MemStorage {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl MemStorage {
    /// Storage without a snapshot file.
    pub fn in_memory() -> Self {
        Self {
            tables: Mutex::new(Tables::default()),
            snapshot: None,
            sync: false,
        }
    }

    pub fn with_snapshot(path: impl Into<PathBuf>, mode: SnapshotMode) -> Self {
        Self {
            tables: Mutex::new(Tables::default()),
            snapshot: Some(Snapshot {
                path: path.into(),
                generation: AtomicU64::new(0),
                written: tokio::sync::Mutex::new(0),
            }),
            sync: mode == SnapshotMode::Sync,
        }
    }

    pub fn from_config(config: &StoreConfig) -> Self {
        match &config.file_storage_path {
            Some(path) => Self::with_snapshot(path.clone(), config.snapshot_mode),
            None => Self::in_memory(),
        }
    }

    pub fn snapshot_path(&self) -> Option<&Path> {
        self.snapshot.as_ref().map(|s| s.path.as_path())
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Validates and applies under one lock acquisition, returning the
    /// serialized table when sync snapshots are on.
    fn mutate(&self, metrics: &[Metric]) -> Result<Option<(u64, Vec<u8>)>, StoreError> {
        validate_all(metrics)?;
        let mut tables = self.lock();
        if let Some(conflict) = metrics.iter().find(|m| tables.conflicts(m)) {
            return Err(StoreError::KindConflict {
                name: conflict.name.clone(),
                requested: conflict.kind(),
            });
        }
        for metric in metrics {
            tables.apply(metric);
        }

        if !self.sync {
            return Ok(None);
        }
        self.serialize(&tables).map(Some)
    }

    fn serialize(&self, tables: &Tables) -> Result<(u64, Vec<u8>), StoreError> {
        let Some(snapshot) = &self.snapshot else {
            return Ok((0, Vec::new()));
        };
        let generation = snapshot.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let body = serde_json::to_vec(&tables.records()).map_err(SnapshotError::from)?;
        Ok((generation, body))
    }

    async fn persist(&self, pending: Option<(u64, Vec<u8>)>) -> Result<(), StoreError> {
        match (&self.snapshot, pending) {
            (Some(snapshot), Some((generation, body))) => {
                snapshot.write(generation, body).await?;
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Writes the full table to the snapshot file. A no-op without one.
    pub async fn store(&self) -> Result<(), StoreError> {
        if self.snapshot.is_none() {
            return Ok(());
        }
        let pending = {
            let tables = self.lock();
            self.serialize(&tables)?
        };
        self.persist(Some(pending)).await
    }

    /// Replaces the table with the snapshot file's contents. A missing or
    /// empty file leaves an empty table.
    pub async fn restore(&self) -> Result<usize, StoreError> {
        let Some(snapshot) = &self.snapshot else {
            return Ok(0);
        };

        let contents = match tokio::fs::read(&snapshot.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!(
                    "No snapshot at {}, starting empty",
                    snapshot.path.display()
                );
                Vec::new()
            }
            Err(e) => return Err(SnapshotError::from(e).into()),
        };

        let records: Vec<MetricRecord> = if contents.iter().all(u8::is_ascii_whitespace) {
            Vec::new()
        } else {
            serde_json::from_slice(&contents).map_err(SnapshotError::from)?
        };

        let mut restored = Tables::default();
        for record in records {
            let metric = Metric::try_from(record).map_err(SnapshotError::Record)?;
            if restored.conflicts(&metric) {
                warn!("Snapshot binds '{}' to both kinds, keeping the first", metric.name);
                continue;
            }
            // Absolute values: a restore replaces, it never adds.
            match metric.value {
                MetricValue::Gauge(v) => {
                    restored.gauges.insert(metric.name, v);
                }
                MetricValue::Counter(d) => {
                    restored.counters.insert(metric.name, d);
                }
            }
        }

        let count = restored.gauges.len() + restored.counters.len();
        *self.lock() = restored;
        info!(
            "Restored {count} metrics from {}",
            snapshot.path.display()
        );
        Ok(count)
    }

    /// Snapshots every `period` until `cancel` fires, then once more.
    pub async fn run_snapshot_loop(self: Arc<Self>, period: Duration, cancel: CancellationToken) {
        if self.snapshot.is_none() {
            return;
        }
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await; // discard first tick, which is instantaneous

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.store().await {
                        error!("Periodic snapshot failed: {e}");
                    }
                }
            }
        }

        match self.store().await {
            Ok(()) => debug!("Final snapshot written"),
            Err(e) => error!("Final snapshot failed: {e}"),
        }
    }
}

#[async_trait]
impl MetricStore for MemStorage {
    async fn update_gauge(&self, name: &str, value: f64) -> Result<(), StoreError> {
        let pending = self.mutate(&[Metric::gauge(name, value)])?;
        self.persist(pending).await
    }

    async fn update_counter(&self, name: &str, delta: i64) -> Result<(), StoreError> {
        let pending = self.mutate(&[Metric::counter(name, delta)])?;
        self.persist(pending).await
    }

    async fn update_batch(&self, metrics: &[Metric]) -> Result<(), StoreError> {
        check_batch_kinds(metrics)?;
        let pending = self.mutate(metrics)?;
        self.persist(pending).await
    }

    async fn read_gauge(&self, name: &str) -> Result<f64, StoreError> {
        self.lock()
            .gauges
            .get(name)
            .copied()
            .ok_or_else(|| StoreError::NotFound {
                kind: MetricKind::Gauge,
                name: name.to_string(),
            })
    }

    async fn read_counter(&self, name: &str) -> Result<i64, StoreError> {
        self.lock()
            .counters
            .get(name)
            .copied()
            .ok_or_else(|| StoreError::NotFound {
                kind: MetricKind::Counter,
                name: name.to_string(),
            })
    }

    async fn read_all(&self) -> Result<Vec<Metric>, StoreError> {
        self.lock()
            .records()
            .into_iter()
            .map(|record| Metric::try_from(record).map_err(StoreError::from))
            .collect()
    }
}
