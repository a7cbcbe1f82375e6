//! Eviction Worker Task
//!
//! Drains the store's eviction queue. Removing an entry and releasing its
//! dependencies runs dependency code, so it happens here rather than on the
//! thread that detected the expiration.

use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::cache::{CacheEntry, EvictionReason, WeakCacheStore};

/// Work queued by the store.
#[derive(Debug)]
pub(crate) enum EvictionTask {
    /// Remove `entry` if it is still the current entry for its key, then
    /// release its dependencies.
    Evict {
        entry: Arc<CacheEntry>,
        reason: EvictionReason,
    },
    /// Release the dependencies of entries already taken out of the map.
    Release(Vec<Arc<CacheEntry>>),
}

impl EvictionTask {
    fn release(self) {
        match self {
            EvictionTask::Evict { entry, .. } => entry.release_dependencies(),
            EvictionTask::Release(entries) => {
                for entry in entries {
                    entry.release_dependencies();
                }
            }
        }
    }
}

/// Spawns the worker on `runtime`. It exits when the store, and with it the
/// sending half of the queue, is dropped.
pub(crate) fn spawn_eviction_worker(
    runtime: &Handle,
    store: WeakCacheStore,
    mut queue: UnboundedReceiver<EvictionTask>,
) -> JoinHandle<()> {
    runtime.spawn(async move {
        debug!("Eviction worker started");
        while let Some(task) = queue.recv().await {
            match store.upgrade() {
                Some(store) => store.run_eviction_task(task),
                None => task.release(),
            }
        }
        debug!("Eviction worker stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheKey, CacheStore, EntryOptions, Expiration};
    use crate::config::CacheConfig;
    use crate::dependency::{Dependency, ManualDependency};
    use chrono::Utc;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn detached_entry(key: &str, dependency: Arc<ManualDependency>) -> Arc<CacheEntry> {
        Arc::new(CacheEntry::new(
            CacheKey::new(key, None).unwrap(),
            Arc::new(1_u32),
            Expiration::Never,
            vec![dependency as Arc<dyn Dependency>],
            Utc::now(),
        ))
    }

    #[tokio::test]
    async fn test_release_task_disposes_dependencies() {
        let store = CacheStore::new(CacheConfig::default()).unwrap();
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = spawn_eviction_worker(&Handle::current(), store.downgrade(), rx);

        let dependency = Arc::new(ManualDependency::new());
        tx.send(EvictionTask::Release(vec![detached_entry("a", dependency.clone())]))
            .unwrap();
        drop(tx);

        handle.await.unwrap();
        assert_eq!(dependency.dispose_count(), 1);
    }

    #[tokio::test]
    async fn test_stale_eviction_keeps_current_entry() {
        let store = CacheStore::new(CacheConfig::default()).unwrap();
        store.add("a", 2_u32, EntryOptions::new()).unwrap();

        let (tx, rx) = mpsc::unbounded_channel();
        let handle = spawn_eviction_worker(&Handle::current(), store.downgrade(), rx);

        let dependency = Arc::new(ManualDependency::new());
        tx.send(EvictionTask::Evict {
            entry: detached_entry("a", dependency.clone()),
            reason: EvictionReason::Expired,
        })
        .unwrap();
        drop(tx);
        handle.await.unwrap();

        assert_eq!(store.get::<u32>("a", None).unwrap(), 2);
        assert_eq!(store.stats().expirations, 0);
        assert_eq!(dependency.dispose_count(), 1);
    }

    #[tokio::test]
    async fn test_worker_releases_when_store_gone() {
        let store = CacheStore::new(CacheConfig::default()).unwrap();
        let weak = store.downgrade();
        drop(store);

        let (tx, rx) = mpsc::unbounded_channel();
        let handle = spawn_eviction_worker(&Handle::current(), weak, rx);
        let dependency = Arc::new(ManualDependency::new());
        tx.send(EvictionTask::Evict {
            entry: detached_entry("a", dependency.clone()),
            reason: EvictionReason::DependencyChanged,
        })
        .unwrap();
        drop(tx);

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(dependency.is_disposed());
    }
}
