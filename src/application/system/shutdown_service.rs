use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Coordinates graceful shutdown of the background tasks the application
/// spawns at start. There is nothing to flatten in this domain: the vault
/// holds the position, not us. Shutdown only needs to stop pulling new work
/// and give in-flight steps a bounded window to land.
pub struct ShutdownService {
    stop_tx: watch::Sender<bool>,
    tasks: Vec<(&'static str, JoinHandle<()>, Duration)>,
}

impl ShutdownService {
    pub fn new(stop_tx: watch::Sender<bool>, tasks: Vec<(&'static str, JoinHandle<()>, Duration)>) -> Self {
        Self { stop_tx, tasks }
    }

    pub async fn shutdown(self) {
        info!("initiating graceful shutdown");
        let _ = self.stop_tx.send(true);

        for (name, mut handle, join_timeout) in self.tasks {
            match tokio::time::timeout(join_timeout, &mut handle).await {
                Ok(Ok(())) => info!(task = name, "stopped cleanly"),
                Ok(Err(e)) => warn!(task = name, error = %e, "task panicked during shutdown"),
                Err(_) => {
                    warn!(task = name, "did not stop within shutdown timeout; aborting");
                    handle.abort();
                }
            }
        }

        info!("graceful shutdown complete");
    }
}
