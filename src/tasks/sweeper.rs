//! Expiration Sweeper Task
//!
//! Background task that periodically scans the store for expired entries.
//! It is started lazily by the first expirable insert and exits once no
//! remaining entry can expire.

use std::time::Duration;

use chrono::Utc;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::cache::WeakCacheStore;

/// Result of one sweep pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SweepReport {
    /// Expirable entries examined
    pub scanned: usize,
    /// Expired entries queued for eviction
    pub scheduled: usize,
    /// True if some examined entry is still live and can expire later
    pub still_required: bool,
}

/// Spawns the sweeper on `runtime`.
///
/// The first pass runs one `interval` after spawning. The task only holds a
/// weak reference to the store between passes, so dropping the last
/// [`CacheStore`](crate::cache::CacheStore) handle ends it.
///
/// # Returns
/// A JoinHandle the store keeps so it can abort the task on shutdown.
pub(crate) fn spawn_expiration_sweeper(
    runtime: &Handle,
    store: WeakCacheStore,
    interval: Duration,
) -> JoinHandle<()> {
    runtime.spawn(async move {
        let mut ticker = time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;

            let Some(store) = store.upgrade() else {
                debug!("Cache store dropped, sweeper exiting");
                break;
            };

            let report = store.sweep_expired(Utc::now());
            if report.scheduled > 0 {
                info!(
                    scanned = report.scanned,
                    expired = report.scheduled,
                    "Expiration sweep queued expired entries"
                );
            } else {
                debug!(scanned = report.scanned, "Expiration sweep found no expired entries");
            }

            if !report.still_required && store.stop_sweeper_if_idle() {
                info!("No expirable entries left, expiration sweeper stopped");
                break;
            }
        }
    })
}
