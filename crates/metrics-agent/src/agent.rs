// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::client::MetricsClient;
use crate::collector::Collector;
use crate::config::AgentConfig;
use crate::delivery::{job_queue, DeliveryStats, WorkerPool};
use crate::errors::AgentError;
use crate::reporter::Reporter;
use crate::table::MetricTable;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Wires the collector, reporter and delivery pool around one metric table.
pub struct Agent {
    config: AgentConfig,
    table: Arc<MetricTable>,
    collector: Collector,
    client: MetricsClient,
}

impl Agent {
    pub fn new(config: AgentConfig, cancel: &CancellationToken) -> Result<Self, AgentError> {
        config.validate()?;
        let table = Arc::new(MetricTable::new());
        let collector = Collector::new(Arc::clone(&table));
        let client = MetricsClient::new(&config, cancel.clone())?;
        Ok(Self {
            config,
            table,
            collector,
            client,
        })
    }

    pub fn table(&self) -> Arc<MetricTable> {
        Arc::clone(&self.table)
    }

    /// Runs until `cancel` fires, then lets queued jobs drain for the
    /// configured grace period.
    pub async fn run(self, cancel: CancellationToken) -> Arc<DeliveryStats> {
        let Self {
            config,
            table,
            collector,
            client,
        } = self;

        info!(
            "Reporting to {} every {} s with {} workers",
            config.base_url(),
            config.report_interval.as_secs(),
            config.rate_limit
        );

        let (tx, rx) = job_queue(config.queue_capacity);
        let pool = WorkerPool::spawn(config.rate_limit, client, rx);
        let reporter = Reporter::new(table, tx, config.report_mode);

        tokio::join!(
            collector.run(config.poll_interval, cancel.clone()),
            reporter.run(config.report_interval, cancel.clone()),
        );

        debug!("Producers stopped, draining delivery queue");
        pool.join(config.shutdown_grace).await
    }
}
