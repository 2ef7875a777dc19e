// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::errors::StoreError;
use crate::memory::MemStorage;
use crate::store::{DurableBackend, MetricStore};
use async_trait::async_trait;
use metrics_model::{Metric, MetricRecord};
use std::sync::Arc;
use tracing::{debug, warn};

/// Routes every operation to the durable backend when its probe answers,
/// and to the volatile backend otherwise.
///
/// On the durable path writes go to the durable backend first and are then
/// mirrored into the volatile backend. Reads are served by whichever backend
/// the probe selected.
pub struct IngestionService {
    durable: Option<Arc<dyn DurableBackend>>,
    volatile: Arc<MemStorage>,
}

enum Route<'a> {
    Durable(&'a dyn DurableBackend),
    Volatile,
}

impl IngestionService {
    pub fn new(volatile: Arc<MemStorage>) -> Self {
        Self {
            durable: None,
            volatile,
        }
    }

    pub fn with_durable(mut self, durable: Arc<dyn DurableBackend>) -> Self {
        self.durable = Some(durable);
        self
    }

    pub fn volatile(&self) -> &Arc<MemStorage> {
        &self.volatile
    }

    /// Reachability of the durable backend. `false` when none is configured.
    pub async fn ping(&self) -> bool {
        match &self.durable {
            Some(durable) => durable.ping().await,
            None => false,
        }
    }

    async fn route(&self) -> Route<'_> {
        match &self.durable {
            Some(durable) if durable.ping().await => Route::Durable(durable.as_ref()),
            Some(_) => {
                debug!("Durable backend unreachable, using in-memory storage");
                Route::Volatile
            }
            None => Route::Volatile,
        }
    }

    fn mirror(&self, result: Result<(), StoreError>) {
        if let Err(e) = result {
            warn!("Durable write succeeded but in-memory mirror failed: {e}");
        }
    }

    /// Validates and applies one wire record, then returns its current value.
    pub async fn update_record(&self, record: MetricRecord) -> Result<Metric, StoreError> {
        let metric = Metric::try_from(record)?;
        self.update(&metric).await?;
        self.read(metric.kind(), &metric.name).await
    }

    /// Validates every record before applying any of them as one batch.
    pub async fn update_records(&self, records: Vec<MetricRecord>) -> Result<usize, StoreError> {
        let metrics = records
            .into_iter()
            .map(Metric::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        self.update_batch(&metrics).await?;
        Ok(metrics.len())
    }
}

#[async_trait]
impl MetricStore for IngestionService {
    async fn update_gauge(&self, name: &str, value: f64) -> Result<(), StoreError> {
        match self.route().await {
            Route::Durable(durable) => {
                durable.update_gauge(name, value).await?;
                self.mirror(self.volatile.update_gauge(name, value).await);
                Ok(())
            }
            Route::Volatile => self.volatile.update_gauge(name, value).await,
        }
    }

    async fn update_counter(&self, name: &str, delta: i64) -> Result<(), StoreError> {
        match self.route().await {
            Route::Durable(durable) => {
                durable.update_counter(name, delta).await?;
                self.mirror(self.volatile.update_counter(name, delta).await);
                Ok(())
            }
            Route::Volatile => self.volatile.update_counter(name, delta).await,
        }
    }

    async fn update_batch(&self, metrics: &[Metric]) -> Result<(), StoreError> {
        match self.route().await {
            Route::Durable(durable) => {
                durable.update_batch(metrics).await?;
                self.mirror(self.volatile.update_batch(metrics).await);
                Ok(())
            }
            Route::Volatile => self.volatile.update_batch(metrics).await,
        }
    }

    async fn read_gauge(&self, name: &str) -> Result<f64, StoreError> {
        match self.route().await {
            Route::Durable(durable) => durable.read_gauge(name).await,
            Route::Volatile => self.volatile.read_gauge(name).await,
        }
    }

    async fn read_counter(&self, name: &str) -> Result<i64, StoreError> {
        match self.route().await {
            Route::Durable(durable) => durable.read_counter(name).await,
            Route::Volatile => self.volatile.read_counter(name).await,
        }
    }

    async fn read_all(&self) -> Result<Vec<Metric>, StoreError> {
        match self.route().await {
            Route::Durable(durable) => durable.read_all().await,
            Route::Volatile => self.volatile.read_all().await,
        }
    }
}
