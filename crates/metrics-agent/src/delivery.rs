// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Fixed-size pool of delivery workers sharing one bounded job queue.
//!
//! Each job is retried by the client on its own budget. A job that still
//! fails is logged, counted as dropped and never re-enqueued.

use crate::client::{MetricsClient, ShippingError};
use crate::table::DeliveryBatch;
use metrics_model::MetricRecord;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum DeliveryJob {
    Batch(DeliveryBatch),
    Single(MetricRecord),
}

impl DeliveryJob {
    async fn execute(&self, client: &MetricsClient) -> Result<(), ShippingError> {
        match self {
            DeliveryJob::Batch(batch) => client.send_batch(batch.records()).await,
            DeliveryJob::Single(record) => client.send_one(record).await,
        }
    }

    fn describe(&self) -> String {
        match self {
            DeliveryJob::Batch(batch) => format!("batch of {} metrics", batch.len()),
            DeliveryJob::Single(record) => format!("metric {}", record.id),
        }
    }
}

#[derive(Debug, Default)]
pub struct DeliveryStats {
    delivered: AtomicU64,
    dropped: AtomicU64,
    cancelled: AtomicU64,
}

impl DeliveryStats {
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    /// Jobs given up on after a terminal response or an exhausted budget.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn cancelled(&self) -> u64 {
        self.cancelled.load(Ordering::Relaxed)
    }
}

/// Creates the bounded job queue feeding the pool.
pub fn job_queue(capacity: usize) -> (Sender<DeliveryJob>, Receiver<DeliveryJob>) {
    mpsc::channel(capacity.max(1))
}

pub struct WorkerPool {
    workers: Vec<JoinHandle<()>>,
    stats: Arc<DeliveryStats>,
}

impl WorkerPool {
    /// Spawns `size` workers that run until the queue is closed and drained.
    pub fn spawn(size: usize, client: MetricsClient, jobs: Receiver<DeliveryJob>) -> Self {
        let jobs = Arc::new(Mutex::new(jobs));
        let stats = Arc::new(DeliveryStats::default());

        let workers = (0..size.max(1))
            .map(|id| {
                let jobs = Arc::clone(&jobs);
                let stats = Arc::clone(&stats);
                let client = client.clone();
                tokio::spawn(async move { run_worker(id, client, jobs, stats).await })
            })
            .collect();

        Self { workers, stats }
    }

    pub fn stats(&self) -> Arc<DeliveryStats> {
        Arc::clone(&self.stats)
    }

    /// Waits up to `grace` for the workers to drain the queue, then aborts
    /// whatever is left.
    pub async fn join(self, grace: Duration) -> Arc<DeliveryStats> {
        let Self { workers, stats } = self;
        let aborts: Vec<_> = workers.iter().map(JoinHandle::abort_handle).collect();

        let drained = tokio::time::timeout(grace, async {
            for worker in workers {
                if let Err(e) = worker.await {
                    error!("Delivery worker failed: {e}");
                }
            }
        })
        .await;

        if drained.is_err() {
            warn!(
                "Delivery queue not drained within {} ms, abandoning remaining jobs",
                grace.as_millis()
            );
            for abort in aborts {
                abort.abort();
            }
        }

        info!(
            "Delivery totals: {} delivered, {} dropped, {} cancelled",
            stats.delivered(),
            stats.dropped(),
            stats.cancelled()
        );
        stats
    }
}

async fn run_worker(
    id: usize,
    client: MetricsClient,
    jobs: Arc<Mutex<Receiver<DeliveryJob>>>,
    stats: Arc<DeliveryStats>,
) {
    loop {
        // The lock is only held while waiting for the next job.
        let job = { jobs.lock().await.recv().await };
        let Some(job) = job else {
            debug!("Delivery worker {id} exiting, queue closed");
            return;
        };

        match job.execute(&client).await {
            Ok(()) => {
                stats.delivered.fetch_add(1, Ordering::Relaxed);
                debug!("Worker {id} delivered {}", job.describe());
            }
            Err(ShippingError::Cancelled) => {
                stats.cancelled.fetch_add(1, Ordering::Relaxed);
                debug!("Worker {id} cancelled {}", job.describe());
            }
            Err(e) => {
                stats.dropped.fetch_add(1, Ordering::Relaxed);
                error!("Dropping {}: {e}", job.describe());
            }
        }
    }
}
