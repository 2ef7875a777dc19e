// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

mod common;

use common::mocks::MockDurable;
use metrics_model::{Metric, MetricKind};
use metrics_store::{IngestionService, MemStorage, MetricStore, SnapshotMode, StoreError};
use std::sync::atomic::Ordering;
use std::sync::Arc;

fn service_with(durable: &Arc<MockDurable>) -> IngestionService {
    IngestionService::new(Arc::new(MemStorage::in_memory())).with_durable(durable.clone())
}

#[tokio::test]
async fn test_counter_updates_sum_on_durable_path() {
    let durable = Arc::new(MockDurable::reachable());
    let service = service_with(&durable);

    service.update_counter("requests", 5).await.unwrap();
    service.update_counter("requests", 3).await.unwrap();

    assert_eq!(service.read_counter("requests").await.unwrap(), 8);
    assert_eq!(durable.rows.read_counter("requests").await.unwrap(), 8);
    // Mirrored into the volatile backend as well.
    assert_eq!(service.volatile().read_counter("requests").await.unwrap(), 8);
}

#[tokio::test]
async fn test_unreachable_durable_falls_back_to_volatile() {
    let durable = Arc::new(MockDurable::unreachable());
    let service = service_with(&durable);

    service.update_gauge("temp", 21.5).await.unwrap();

    assert_eq!(service.read_gauge("temp").await.unwrap(), 21.5);
    assert_eq!(durable.writes.load(Ordering::SeqCst), 0);
    assert!(durable.rows.read_all().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_every_operation_probes_the_durable_backend() {
    let durable = Arc::new(MockDurable::reachable());
    let service = service_with(&durable);

    service.update_gauge("temp", 1.0).await.unwrap();
    service.read_gauge("temp").await.unwrap();
    service.read_all().await.unwrap();

    assert_eq!(durable.probes.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_durable_failure_is_surfaced_and_not_mirrored() {
    let durable = Arc::new(MockDurable::reachable());
    durable.fail_writes();
    let service = service_with(&durable);

    let err = service.update_gauge("temp", 21.5).await.unwrap_err();
    assert!(matches!(err, StoreError::Database(_)), "{err}");

    let volatile = service.volatile().read_gauge("temp").await;
    assert!(matches!(volatile, Err(StoreError::NotFound { .. })));
}

#[tokio::test]
async fn test_reads_follow_the_probe() {
    let durable = Arc::new(MockDurable::reachable());
    let service = service_with(&durable);
    service.update_gauge("temp", 20.0).await.unwrap();

    durable.set_reachable(false);
    service.update_gauge("temp", 25.0).await.unwrap();
    assert_eq!(service.read_gauge("temp").await.unwrap(), 25.0);

    durable.set_reachable(true);
    assert_eq!(service.read_gauge("temp").await.unwrap(), 20.0);
}

#[tokio::test]
async fn test_batch_kind_conflict_applies_nothing() {
    let durable = Arc::new(MockDurable::reachable());
    let service = service_with(&durable);
    service.update_gauge("Alloc", 1.0).await.unwrap();

    let batch = [Metric::counter("PollCount", 1), Metric::counter("Alloc", 2)];
    let err = service.update_batch(&batch).await.unwrap_err();
    assert!(matches!(
        err,
        StoreError::KindConflict { ref name, requested: MetricKind::Counter } if name == "Alloc"
    ));

    assert!(matches!(
        service.read_counter("PollCount").await,
        Err(StoreError::NotFound { .. })
    ));
    assert_eq!(service.read_gauge("Alloc").await.unwrap(), 1.0);
}

#[tokio::test]
async fn test_volatile_snapshot_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("metrics.json");

    let first = IngestionService::new(Arc::new(MemStorage::with_snapshot(
        path.clone(),
        SnapshotMode::Sync,
    )));
    first
        .update_batch(&[Metric::gauge("temp", 21.5), Metric::counter("requests", 8)])
        .await
        .unwrap();

    let volatile = Arc::new(MemStorage::with_snapshot(path, SnapshotMode::Sync));
    assert_eq!(volatile.restore().await.unwrap(), 2);
    let second = IngestionService::new(volatile);
    assert_eq!(second.read_counter("requests").await.unwrap(), 8);
    assert_eq!(second.read_gauge("temp").await.unwrap(), 21.5);
}
