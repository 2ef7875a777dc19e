// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The agent-side metric table shared by the collectors and the reporter.
//!
//! Gauges keep their last sample. Counters keep a cumulative total and the
//! delta accumulated since the last report; draining ships the pending delta
//! and resets it while the total keeps growing.

use crate::errors::TableError;
use metrics_model::{Metric, MetricKind, MetricRecord, MetricValue};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Entry {
    Gauge(f64),
    Counter { total: i64, pending: i64 },
}

impl Entry {
    fn kind(&self) -> MetricKind {
        match self {
            Entry::Gauge(_) => MetricKind::Gauge,
            Entry::Counter { .. } => MetricKind::Counter,
        }
    }
}

/// Records drained from the table in one report cycle, sorted by name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeliveryBatch {
    records: Vec<MetricRecord>,
}

impl DeliveryBatch {
    pub fn records(&self) -> &[MetricRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn into_records(self) -> Vec<MetricRecord> {
        self.records
    }
}

#[derive(Debug, Default)]
pub struct MetricTable {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MetricTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        // A panicking writer cannot leave an entry half-updated.
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn apply(entries: &mut HashMap<String, Entry>, metric: &Metric) -> Result<(), TableError> {
        if let MetricValue::Gauge(v) = metric.value {
            if !v.is_finite() {
                return Err(TableError::NonFinite {
                    name: metric.name.clone(),
                    value: v,
                });
            }
        }
        match (entries.get_mut(&metric.name), metric.value) {
            (None, MetricValue::Gauge(v)) => {
                entries.insert(metric.name.clone(), Entry::Gauge(v));
            }
            (None, MetricValue::Counter(d)) => {
                entries.insert(
                    metric.name.clone(),
                    Entry::Counter {
                        total: d,
                        pending: d,
                    },
                );
            }
            (Some(Entry::Gauge(current)), MetricValue::Gauge(v)) => *current = v,
            (Some(Entry::Counter { total, pending }), MetricValue::Counter(d)) => {
                *total = total.saturating_add(d);
                *pending = pending.saturating_add(d);
            }
            (Some(existing), value) => {
                return Err(TableError::KindConflict {
                    name: metric.name.clone(),
                    existing: existing.kind(),
                    requested: value.kind(),
                });
            }
        }
        Ok(())
    }

    pub fn set_gauge(&self, name: &str, value: f64) -> Result<(), TableError> {
        Self::apply(&mut self.lock(), &Metric::gauge(name, value))
    }

    pub fn add_counter(&self, name: &str, delta: i64) -> Result<(), TableError> {
        Self::apply(&mut self.lock(), &Metric::counter(name, delta))
    }

    /// Applies one source's samples under a single lock acquisition. Samples
    /// that conflict with an existing kind or are not finite are skipped and
    /// counted.
    pub fn record(&self, samples: &[Metric]) -> usize {
        let mut entries = self.lock();
        let mut rejected = 0;
        for sample in samples {
            if let Err(e) = Self::apply(&mut entries, sample) {
                warn!("Dropping sample: {e}");
                rejected += 1;
            }
        }
        rejected
    }

    /// Copies every gauge and takes every counter's pending delta.
    pub fn drain(&self) -> DeliveryBatch {
        let mut records: Vec<MetricRecord> = {
            let mut entries = self.lock();
            entries
                .iter_mut()
                .map(|(name, entry)| match entry {
                    Entry::Gauge(v) => MetricRecord::from(Metric::gauge(name.as_str(), *v)),
                    Entry::Counter { pending, .. } => {
                        let delta = std::mem::take(pending);
                        MetricRecord::from(Metric::counter(name.as_str(), delta))
                    }
                })
                .collect()
        };
        records.sort_by(|a, b| a.id.cmp(&b.id));
        DeliveryBatch { records }
    }

    pub fn gauge(&self, name: &str) -> Option<f64> {
        match self.lock().get(name) {
            Some(Entry::Gauge(v)) => Some(*v),
            _ => None,
        }
    }

    /// Cumulative total since the agent started.
    pub fn counter_total(&self, name: &str) -> Option<i64> {
        match self.lock().get(name) {
            Some(Entry::Counter { total, .. }) => Some(*total),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
