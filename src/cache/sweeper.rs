//! Background purge of expired entries.

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};

use super::backend::CacheBackend;
use super::stats::METRIC_SWEPT;

/// Handle on the running sweep task.
pub(crate) struct SweeperHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Signal the task to stop and wait until it has.
    pub(crate) async fn stop(self) {
        self.shutdown.send_replace(true);
        if let Err(err) = self.task.await {
            warn!(target = "roamly::cache::sweeper", error = %err, "sweep task ended abnormally");
        }
    }
}

/// Spawn the periodic sweep on the current runtime.
pub(crate) fn spawn(
    backend: Arc<dyn CacheBackend>,
    period: Duration,
    batch_size: usize,
) -> SweeperHandle {
    let (shutdown, signal) = watch::channel(false);
    let task = tokio::spawn(run(backend, period, batch_size, signal));
    info!(
        target = "roamly::cache::sweeper",
        period_secs = period.as_secs(),
        batch_size,
        "cache sweeper started"
    );
    SweeperHandle { shutdown, task }
}

async fn run(
    backend: Arc<dyn CacheBackend>,
    period: Duration,
    batch_size: usize,
    mut signal: watch::Receiver<bool>,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            changed = signal.changed() => {
                if changed.is_err() || *signal.borrow() {
                    break;
                }
            }
            _ = ticker.tick() => {
                sweep_once(backend.as_ref(), batch_size).await;
            }
        }
    }

    debug!(target = "roamly::cache::sweeper", "cache sweeper stopped");
}

/// Run a single purge pass; returns how many entries were removed.
pub(crate) async fn sweep_once(backend: &dyn CacheBackend, batch_size: usize) -> usize {
    match backend.purge_expired(batch_size).await {
        Ok(0) => 0,
        Ok(purged) => {
            counter!(METRIC_SWEPT).increment(purged as u64);
            debug!(
                target = "roamly::cache::sweeper",
                purged, "purged expired cache entries"
            );
            purged
        }
        Err(err) => {
            warn!(
                target = "roamly::cache::sweeper",
                error = %err,
                "cache sweep failed"
            );
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use bytes::Bytes;

    use super::*;
    use crate::cache::store::MemoryStore;

    #[tokio::test(start_paused = true)]
    async fn sweeper_purges_on_each_tick_and_stops() {
        let store = Arc::new(MemoryStore::new());
        store.set(
            "short",
            Bytes::from_static(b"1"),
            Duration::from_secs(5),
            HashSet::from(["t".to_string()]),
        );
        store.set(
            "long",
            Bytes::from_static(b"2"),
            Duration::from_secs(3600),
            HashSet::new(),
        );

        let backend: Arc<dyn CacheBackend> = store.clone();
        let handle = spawn(backend, Duration::from_secs(10), 16);

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(store.len(), 1);
        assert!(store.keys_for_tag("t").is_empty());

        handle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_once_reports_zero_when_nothing_expired() {
        let store = MemoryStore::new();
        store.set(
            "k",
            Bytes::from_static(b"1"),
            Duration::from_secs(60),
            HashSet::new(),
        );
        assert_eq!(sweep_once(&store, 8).await, 0);
        assert_eq!(store.len(), 1);
    }
}
