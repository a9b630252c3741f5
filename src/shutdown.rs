use std::sync::Arc;

use actix_web::dev::ServerHandle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::db::JobStore;
use crate::worker::{JobWorker, WorkerError, WorkerSummary};

/// Resolve on CTRL+C or SIGTERM (Unix only)
///
/// A handler that cannot be installed is logged and never fires, so the
/// other signal still works.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install CTRL+C signal handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received CTRL+C signal, initiating graceful shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM signal, initiating graceful shutdown...");
        }
    }
}

/// Handles graceful shutdown of the scheduler
///
/// This orchestrates graceful shutdown by:
/// 1. Listening for shutdown signals (SIGTERM, SIGINT/CTRL+C)
/// 2. Stopping the HTTP server (in-flight requests finish first)
/// 3. Closing the job store
///
/// Queued and dispatched jobs stay in the store; workers keep their results
/// and retry delivery until a scheduler answers again.
pub struct ShutdownCoordinator {
    server_handle: ServerHandle,
    server_task: JoinHandle<Result<(), std::io::Error>>,
    store: Arc<dyn JobStore>,
}

impl ShutdownCoordinator {
    pub fn new(
        server_handle: ServerHandle,
        server_task: JoinHandle<Result<(), std::io::Error>>,
        store: Arc<dyn JobStore>,
    ) -> Self {
        Self {
            server_handle,
            server_task,
            store,
        }
    }

    /// Wait for a shutdown signal, then stop the server and close the store
    pub async fn wait_for_shutdown(self) -> Result<(), std::io::Error> {
        shutdown_signal().await;
        self.shutdown().await
    }

    async fn shutdown(self) -> Result<(), std::io::Error> {
        info!("Stopping HTTP server (no longer accepting new requests)...");
        self.server_handle.stop(true).await;

        info!("Waiting for HTTP server to fully shut down...");
        let result = match self.server_task.await {
            Ok(Ok(())) => {
                info!("HTTP server shut down successfully");
                Ok(())
            }
            Ok(Err(e)) => {
                error!("HTTP server encountered error during shutdown: {:?}", e);
                Err(e)
            }
            Err(e) => {
                error!("HTTP server task panicked: {:?}", e);
                Err(std::io::Error::new(std::io::ErrorKind::Other, e))
            }
        };

        info!("Closing job store...");
        self.store.close().await;
        info!("Graceful shutdown completed");
        result
    }
}

/// Run `worker` until the scheduler sends `shutdown` or the process gets a
/// signal; either way in-flight jobs are drained and reported first
pub async fn run_worker(worker: &JobWorker) -> Result<WorkerSummary, WorkerError> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let run = worker.run(shutdown_rx);
    tokio::pin!(run);

    tokio::select! {
        summary = &mut run => summary,
        _ = shutdown_signal() => {
            info!("Signaling worker {} to stop fetching jobs...", worker.name());
            if let Err(e) = shutdown_tx.send(true) {
                error!("Failed to send shutdown signal to worker: {:?}", e);
            }
            run.await
        }
    }
}
