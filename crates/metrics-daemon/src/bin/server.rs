// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use anyhow::Context;
use metrics_daemon::config::ServerConfig;
use metrics_daemon::server::{self, MetricsServer};
use metrics_daemon::{logger, shutdown};
use metrics_store::{DurableBackend, IngestionService, MemStorage, PostgresBackend, SnapshotMode};
use std::env;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[tokio::main]
pub async fn main() -> ExitCode {
    let log_level = env::var("LOG_LEVEL")
        .map(|val| val.to_lowercase())
        .unwrap_or("info".to_string());
    if let Err(e) = logger::init(logger::SERVER_PREFIX, &log_level) {
        eprintln!("Unable to set up logging: {e}");
        return ExitCode::FAILURE;
    }
    debug!("Logging subsystem enabled");

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> anyhow::Result<()> {
    let config = ServerConfig::from_env().context("Error loading server configuration")?;
    let cancel = CancellationToken::new();
    tokio::spawn(shutdown::cancel_on_signal(cancel.clone()));

    let volatile = Arc::new(MemStorage::from_config(&config.store));
    if config.store.restore {
        volatile
            .restore()
            .await
            .context("Error restoring metrics snapshot")?;
    }

    let mut service = IngestionService::new(Arc::clone(&volatile));
    if let Some(dsn) = &config.store.database_dsn {
        let postgres = PostgresBackend::connect_lazy(
            dsn,
            config.store.max_connections,
            config.store.probe_timeout,
            cancel.clone(),
        )
        .context("Error configuring database pool")?;
        // A successful probe also creates the metrics table.
        if !postgres.ping().await {
            warn!("Database unreachable at startup, serving from memory until it answers");
        }
        service = service.with_durable(Arc::new(postgres));
    }

    let snapshot_task = match config.store.snapshot_mode {
        SnapshotMode::Interval(period) => Some(tokio::spawn(
            Arc::clone(&volatile).run_snapshot_loop(period, cancel.clone()),
        )),
        SnapshotMode::Sync => None,
    };

    let server = Arc::new(
        MetricsServer::new(service, config.key.as_deref()).context("Error loading signing key")?,
    );
    let listener = TcpListener::bind(config.bind_address())
        .await
        .with_context(|| format!("Error binding {}", config.bind_address()))?;

    let served = server::serve_tcp(listener, server, cancel.clone()).await;
    // Stop the snapshot loop even when the listener failed, so it writes
    // its final snapshot.
    cancel.cancel();
    if let Some(task) = snapshot_task {
        if let Err(e) = task.await {
            error!("Snapshot task failed: {e}");
        }
    }
    served.context("Server stopped")?;
    info!("Server stopped");
    Ok(())
}
