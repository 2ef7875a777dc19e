// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::errors::StoreError;
use async_trait::async_trait;
use metrics_model::{Metric, MetricKind, MetricValue};

/// Current gauge and counter values, independent of where they live.
///
/// A name is bound to one kind; writing it under the other kind fails with
/// [`StoreError::KindConflict`] and changes nothing.
#[async_trait]
pub trait MetricStore: Send + Sync {
    async fn update_gauge(&self, name: &str, value: f64) -> Result<(), StoreError>;

    async fn update_counter(&self, name: &str, delta: i64) -> Result<(), StoreError>;

    /// Applies every metric or none of them.
    async fn update_batch(&self, metrics: &[Metric]) -> Result<(), StoreError>;

    async fn read_gauge(&self, name: &str) -> Result<f64, StoreError>;

    /// Cumulative sum of every delta applied to `name`.
    async fn read_counter(&self, name: &str) -> Result<i64, StoreError>;

    /// Every metric, sorted by name.
    async fn read_all(&self) -> Result<Vec<Metric>, StoreError>;

    async fn update(&self, metric: &Metric) -> Result<(), StoreError> {
        match metric.value {
            MetricValue::Gauge(v) => self.update_gauge(&metric.name, v).await,
            MetricValue::Counter(d) => self.update_counter(&metric.name, d).await,
        }
    }

    async fn read(&self, kind: MetricKind, name: &str) -> Result<Metric, StoreError> {
        match kind {
            MetricKind::Gauge => Ok(Metric::gauge(name, self.read_gauge(name).await?)),
            MetricKind::Counter => Ok(Metric::counter(name, self.read_counter(name).await?)),
        }
    }
}

/// A store of record that may be unreachable.
#[async_trait]
pub trait DurableBackend: MetricStore {
    /// Cheap reachability check, run before every dispatch decision.
    async fn ping(&self) -> bool;
}

/// Rejects the whole batch if any metric fails [`Metric::validate`].
pub(crate) fn validate_all(metrics: &[Metric]) -> Result<(), StoreError> {
    for metric in metrics {
        metric.validate()?;
    }
    Ok(())
}

/// Rejects a batch that binds one name to both kinds.
pub(crate) fn check_batch_kinds(metrics: &[Metric]) -> Result<(), StoreError> {
    let mut seen = std::collections::HashMap::new();
    for metric in metrics {
        let kind = metric.kind();
        if let Some(previous) = seen.insert(metric.name.as_str(), kind) {
            if previous != kind {
                return Err(StoreError::KindConflict {
                    name: metric.name.clone(),
                    requested: kind,
                });
            }
        }
    }
    Ok(())
}
