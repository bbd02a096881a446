use crate::config::{REAPER_INTERVAL, STALE_UPLOAD_MAX_AGE};
use crate::services::quota::QuotaService;
use crate::services::upload::UploadTracker;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::sleep;

/// Runs the stale upload reaper until shutdown is signalled.
pub struct BackgroundWorker {
    tracker: Arc<UploadTracker>,
    quota: QuotaService,
    shutdown: watch::Receiver<bool>,
}

impl BackgroundWorker {
    pub fn new(
        tracker: Arc<UploadTracker>,
        quota: QuotaService,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            tracker,
            quota,
            shutdown,
        }
    }

    pub async fn run(mut self) {
        tracing::info!("🚀 Background worker started");

        loop {
            tokio::select! {
                _ = self.shutdown.changed() => {
                    tracing::info!("🛑 Background worker shutting down");
                    break;
                }
                _ = sleep(REAPER_INTERVAL) => {
                    self.perform_cleanup();
                }
            }
        }
    }

    fn perform_cleanup(&self) {
        tracing::debug!("🧹 Running background cleanup tasks...");

        let reaped = reap_stale_uploads(&self.tracker, STALE_UPLOAD_MAX_AGE);
        let locks = self.quota.prune_locks();

        if reaped > 0 || locks > 0 {
            tracing::info!(
                "✅ Background cleanup completed: {} stale uploads, {} idle quota locks",
                reaped,
                locks
            );
        }
    }
}

/// Evicts transfers older than `max_age`, deleting their chunk files. Returns how many went.
pub fn reap_stale_uploads(tracker: &UploadTracker, max_age: Duration) -> usize {
    let cutoff = chrono::Duration::from_std(max_age)
        .ok()
        .and_then(|age| Utc::now().checked_sub_signed(age))
        .unwrap_or(chrono::DateTime::<Utc>::MIN_UTC);

    let evicted = tracker.evict_older_than(cutoff);
    let count = evicted.len();

    for (upload_id, transfer) in evicted {
        tracing::info!(
            upload_id = %upload_id,
            owner_id = %transfer.owner_id,
            file_name = %transfer.file_name,
            chunks = transfer.chunks.len(),
            created_at = %transfer.created_at,
            "Removing stale upload"
        );
        // Dropping the transfer deletes its chunk files; missing files are ignored.
        drop(transfer);
    }

    count
}
