// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::config::ReportMode;
use crate::delivery::DeliveryJob;
use crate::table::MetricTable;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::Sender;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Drains the metric table on every report tick and enqueues the result.
pub struct Reporter {
    table: Arc<MetricTable>,
    jobs: Sender<DeliveryJob>,
    mode: ReportMode,
}

impl Reporter {
    pub fn new(table: Arc<MetricTable>, jobs: Sender<DeliveryJob>, mode: ReportMode) -> Self {
        Self { table, jobs, mode }
    }

    /// Runs until `cancel` fires. Dropping the reporter on return closes the
    /// job queue so the workers can drain and exit.
    pub async fn run(self, report_interval: Duration, cancel: CancellationToken) {
        let mut ticker = interval(report_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await; // discard first tick, which is instantaneous

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if !self.report_once(&cancel).await {
                        break;
                    }
                }
            }
        }
        debug!("Reporter stopped, closing delivery queue");
    }

    /// Drains the table once and enqueues its jobs, waiting for queue space.
    /// Returns `false` once nothing more can be enqueued.
    pub async fn report_once(&self, cancel: &CancellationToken) -> bool {
        let batch = self.table.drain();
        if batch.is_empty() {
            debug!("Nothing to report");
            return true;
        }

        let jobs = match self.mode {
            ReportMode::Batch => vec![DeliveryJob::Batch(batch)],
            ReportMode::Single => batch
                .into_records()
                .into_iter()
                .map(DeliveryJob::Single)
                .collect(),
        };

        debug!("Enqueueing {} delivery jobs", jobs.len());
        for job in jobs {
            let sent = tokio::select! {
                biased;
                _ = cancel.cancelled() => false,
                res = self.jobs.send(job) => res.is_ok(),
            };
            if !sent {
                debug!("Delivery queue unavailable, stopping report");
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::job_queue;

    #[tokio::test]
    async fn test_batch_mode_enqueues_one_job() {
        let table = Arc::new(MetricTable::new());
        table.set_gauge("Alloc", 1.0).unwrap();
        table.add_counter("PollCount", 2).unwrap();
        let (tx, mut rx) = job_queue(4);

        let reporter = Reporter::new(Arc::clone(&table), tx, ReportMode::Batch);
        assert!(reporter.report_once(&CancellationToken::new()).await);
        drop(reporter);

        let Some(DeliveryJob::Batch(batch)) = rx.recv().await else {
            panic!("expected a batch job");
        };
        assert_eq!(batch.len(), 2);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_single_mode_enqueues_one_job_per_metric() {
        let table = Arc::new(MetricTable::new());
        table.set_gauge("Alloc", 1.0).unwrap();
        table.add_counter("PollCount", 2).unwrap();
        let (tx, mut rx) = job_queue(4);

        let reporter = Reporter::new(table, tx, ReportMode::Single);
        assert!(reporter.report_once(&CancellationToken::new()).await);
        drop(reporter);

        let mut ids = Vec::new();
        while let Some(job) = rx.recv().await {
            match job {
                DeliveryJob::Single(record) => ids.push(record.id),
                other => panic!("unexpected job {other:?}"),
            }
        }
        assert_eq!(ids, vec!["Alloc", "PollCount"]);
    }

    #[tokio::test]
    async fn test_empty_table_enqueues_nothing() {
        let (tx, mut rx) = job_queue(1);
        let reporter = Reporter::new(Arc::new(MetricTable::new()), tx, ReportMode::Batch);
        assert!(reporter.report_once(&CancellationToken::new()).await);
        drop(reporter);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_full_queue_blocks_until_cancelled() {
        let table = Arc::new(MetricTable::new());
        table.set_gauge("Alloc", 1.0).unwrap();
        let (tx, _rx) = job_queue(1);
        let reporter = Reporter::new(table, tx, ReportMode::Batch);
        let cancel = CancellationToken::new();

        assert!(reporter.report_once(&cancel).await);

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });
        // queue holds one job nobody consumes
        assert!(!reporter.report_once(&cancel).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_reports_each_interval_then_closes_queue() {
        let table = Arc::new(MetricTable::new());
        table.add_counter("PollCount", 1).unwrap();
        let (tx, mut rx) = job_queue(8);
        let cancel = CancellationToken::new();

        let reporter = Reporter::new(Arc::clone(&table), tx, ReportMode::Batch);
        let handle = tokio::spawn(reporter.run(Duration::from_secs(10), cancel.clone()));

        tokio::time::sleep(Duration::from_secs(25)).await;
        cancel.cancel();
        handle.await.unwrap();

        let mut jobs = 0;
        while rx.recv().await.is_some() {
            jobs += 1;
        }
        // reports at 10s and 20s, none at start
        assert_eq!(jobs, 2);
    }
}
