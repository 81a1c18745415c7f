use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self as tokio_time, MissedTickBehavior};
use tracing::{info, warn};

use crate::store::LogStore;

pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(60 * 60);
const CLEANUP_DEADLINE: Duration = Duration::from_secs(5 * 60);

/// Background retention loop: fires immediately on start, then every
/// `interval`, deleting rows older than `retention_days`. A zero retention
/// disables cleanup (the caller should not spawn it).
pub fn spawn_retention<T: Send + 'static>(
    label: &'static str,
    store: Arc<dyn LogStore<T>>,
    retention_days: u32,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio_time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                // The first tick completes immediately.
                _ = ticker.tick() => {
                    let cutoff = OffsetDateTime::now_utc()
                        - time::Duration::days(i64::from(retention_days));
                    match tokio_time::timeout(CLEANUP_DEADLINE, store.delete_before(cutoff)).await {
                        Ok(Ok(deleted)) if deleted > 0 => {
                            info!(logger = label, deleted, "retention cleanup");
                        }
                        Ok(Ok(_)) => {}
                        Ok(Err(err)) => warn!(logger = label, error = %err, "retention cleanup failed"),
                        Err(_) => warn!(logger = label, "retention cleanup timed out"),
                    }
                }
                _ = shutdown.changed() => break,
            }
        }
    })
}
