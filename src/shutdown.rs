use std::sync::Arc;

use tokio::signal;

use crate::server::AppState;

/// Wait for a shutdown signal (SIGINT or SIGTERM).
pub async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown...");
        }
    }
}

/// Report runs that are being abandoned.
///
/// Runs have no mid-phase cancellation; anything still in flight stops with the process.
/// Their branches and pull requests stay on the remote, and a retried request may repeat
/// those side effects.
pub async fn graceful_shutdown(state: &Arc<AppState>) {
    tracing::info!("Starting graceful shutdown...");

    let in_flight = state.runs.in_flight().await;

    if in_flight.is_empty() {
        tracing::info!("No in-flight runs");
        return;
    }

    tracing::warn!(count = in_flight.len(), "Abandoning in-flight runs");

    for run in in_flight {
        tracing::warn!(
            run_id = %run.run_id,
            phase = %run.phase,
            started_at = %run.started_at,
            requirement = %run.requirement,
            "Run interrupted by shutdown"
        );
    }

    tracing::info!("Graceful shutdown complete");
}
