// SPDX-FileCopyrightText: 2026 Codeplan Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Ctrl+C handling.
//!
//! The first SIGINT (or SIGTERM) cancels every in-flight generation through
//! the orchestrator, so partial content stays in the store marked cancelled.

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::orchestrator::GenerationOrchestrator;

/// Installs signal handlers that cancel all generations of `orchestrator`.
///
/// Returns a token that is cancelled once a signal has been handled.
pub fn install_signal_handler(orchestrator: GenerationOrchestrator) -> CancellationToken {
    let token = CancellationToken::new();
    let token_clone = token.clone();

    tokio::spawn(async move {
        wait_for_signal().await;
        let cancelled = orchestrator.cancel_all();
        info!(cancelled, "shutdown requested, generations cancelled");
        token_clone.cancel();
        debug!("shutdown signal handler completed");
    });

    token
}

async fn wait_for_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("received SIGINT (Ctrl+C)"),
                    _ = sigterm.recv() => info!("received SIGTERM"),
                }
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler, listening for Ctrl+C only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
        info!("received Ctrl+C");
    }
}
