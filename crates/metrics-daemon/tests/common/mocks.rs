// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Mock durable backend that always answers its probe

use async_trait::async_trait;
use metrics_model::Metric;
use metrics_store::{DurableBackend, MemStorage, MetricStore, StoreError};

#[derive(Default)]
pub struct ReachableDurable {
    pub rows: MemStorage,
}

#[async_trait]
impl MetricStore for ReachableDurable {
    async fn update_gauge(&self, name: &str, value: f64) -> Result<(), StoreError> {
        self.rows.update_gauge(name, value).await
    }

    async fn update_counter(&self, name: &str, delta: i64) -> Result<(), StoreError> {
        self.rows.update_counter(name, delta).await
    }

    async fn update_batch(&self, metrics: &[Metric]) -> Result<(), StoreError> {
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
impl DurableBackend for ReachableDurable {
    async fn ping(&self) -> bool {
        true
    }
}
