//! Scheduled removal of expired session records.
//!
//! Expired records already read as absent; this only reclaims their space.

use crate::session::SessionBackend;
use std::time::Duration;
use tracing::{error, info};

/// Interval between cleanup runs.
const CLEANUP_INTERVAL: Duration = Duration::from_secs(60 * 60); // 1 hour

/// Run all cleanup tasks once.
pub async fn run_cleanup(sessions: &SessionBackend) {
    match sessions.purge_expired().await {
        Ok(count) if count > 0 => info!(
            backend = sessions.name(),
            count, "Cleaned up expired sessions"
        ),
        Ok(_) => {}
        Err(e) => error!(backend = sessions.name(), error = %e, "Failed to clean up expired sessions"),
    }
}

/// Spawn a background task that runs cleanup periodically.
/// Returns a handle that can be used to abort the task.
pub fn spawn_cleanup_scheduler(sessions: SessionBackend) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(CLEANUP_INTERVAL);

        loop {
            interval.tick().await;
            run_cleanup(&sessions).await;
        }
    })
}
