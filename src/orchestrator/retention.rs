//! Retention service for time-based session eviction.
//!
//! Runs as a background task removing terminal sessions from the live
//! registry once they have been terminal longer than the configured
//! retention window. Eviction also drops the session's broadcast channel,
//! so subscribers must attach within the window to see the terminal event.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::orchestrator::session_manager::SessionManager;

const EVICTION_INTERVAL: Duration = Duration::from_secs(60);

/// Spawn the eviction background task.
///
/// The task ticks every minute until the `CancellationToken` fires.
#[must_use]
pub fn spawn_eviction_task(
    manager: Arc<SessionManager>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(EVICTION_INTERVAL);
        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    info!("eviction task shutting down");
                    break;
                }
                _ = interval.tick() => {
                    let evicted = manager.evict_expired();
                    if evicted > 0 {
                        info!(evicted, "expired sessions evicted");
                    }
                }
            }
        }
    })
}
