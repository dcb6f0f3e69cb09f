//! Scheduled purge of expired sessions.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use crate::audit::{AuditEventKind, AuditSink};
use crate::db::SessionStore;

/// Interval between cleanup runs unless configured otherwise.
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(60 * 60); // 1 hour

/// Purge expired sessions once. Errors are logged, never returned, so a failed
/// sweep only delays the next one. Returns the number of purged rows on success.
pub async fn run_cleanup(sessions: &SessionStore, audit: &dyn AuditSink) -> Option<u64> {
    match sessions.purge_expired().await {
        Ok(count) => {
            if count > 0 {
                info!(count, "Cleaned up expired sessions");
            }
            audit.log_event(AuditEventKind::SessionsPurged, &[("count", count.to_string())]);
            Some(count)
        }
        Err(e) => {
            error!(error = %e, "Failed to clean up expired sessions");
            None
        }
    }
}

/// Spawn a background task that purges expired sessions every `interval`.
/// Returns a handle that can be used to abort the task.
pub fn spawn_cleanup_scheduler(
    sessions: SessionStore,
    audit: Arc<dyn AuditSink>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; startup already ran a purge.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            run_cleanup(&sessions, audit.as_ref()).await;
        }
    })
}
