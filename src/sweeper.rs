//! `SweeperLoop`: a periodic task invoking
//! `QueueManager::housekeep`. Cancellable on shutdown, never blocks
//! process exit.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::domain::manager::QueueManager;

/// Run the sweep loop until `cancel` is triggered.
pub async fn run(manager: Arc<QueueManager>, interval: Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(interval);
    // The first tick fires immediately; skip it so the first real sweep
    // happens one interval after startup.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                tracing::debug!("running sweeper pass");
                manager.housekeep().await;
            }
            _ = cancel.cancelled() => {
                tracing::info!("sweeper loop cancelled, exiting");
                break;
            }
        }
    }
}
