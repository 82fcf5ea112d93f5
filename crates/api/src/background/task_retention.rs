//! Periodic eviction of finished tasks.
//!
//! Terminal tasks stay queryable for the configured retention period and
//! are then dropped from the tracker. Runs on a fixed interval using
//! `tokio::time::interval`.

use std::sync::Arc;
use std::time::Duration;

use sdgate_pipeline::TaskTracker;
use tokio_util::sync::CancellationToken;

/// How often the sweep runs.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Run the task retention loop until `cancel` is triggered.
///
/// Evicts tasks whose terminal status is older than `retention`.
pub async fn run(
    tracker: Arc<TaskTracker>,
    retention: Duration,
    interval: Duration,
    cancel: CancellationToken,
) {
    tracing::info!(
        retention_secs = retention.as_secs(),
        interval_secs = interval.as_secs(),
        "Task retention job started"
    );

    let mut ticker = tokio::time::interval(interval);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Task retention job stopping");
                break;
            }
            _ = ticker.tick() => {
                let evicted = tracker.evict_expired(retention).await;
                if evicted > 0 {
                    tracing::info!(evicted, "Task retention: evicted finished tasks");
                } else {
                    tracing::debug!("Task retention: nothing to evict");
                }
            }
        }
    }
}
