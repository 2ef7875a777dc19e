// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Resolves on Ctrl-C, or on SIGTERM where signals exist.
pub async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = terminate.recv() => {}
                }
            }
            Err(e) => {
                warn!("Unable to listen for SIGTERM: {e}");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

/// Cancels `cancel` once a shutdown signal arrives.
pub async fn cancel_on_signal(cancel: CancellationToken) {
    tokio::select! {
        _ = wait_for_signal() => {
            info!("Shutdown signal received");
            cancel.cancel();
        }
        _ = cancel.cancelled() => {}
    }
}
