//! Cache Store Module
//!
//! Concurrency-safe map from composite key to entry, combining add/get/remove,
//! atomic get-or-add memoization, and the lazily started expiration sweep.

use std::any::{type_name, Any};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use parking_lot::ReentrantMutex;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::{
    CacheEntry, CacheKey, CacheStats, CacheValue, EntryOptions, EvictionReason, Expiration,
};
use crate::config::CacheConfig;
use crate::dependency::Dependency;
use crate::error::{CacheError, Result};
use crate::tasks::{spawn_eviction_worker, spawn_expiration_sweeper, EvictionTask, SweepReport};

// == Store State ==
/// Everything guarded by the store lock.
struct StoreState {
    entries: HashMap<CacheKey, Arc<CacheEntry>>,
    sweeper: Option<JoinHandle<()>>,
    stats: CacheStats,
}

impl StoreState {
    fn sync_total(&mut self) {
        self.stats.set_total_entries(self.entries.len());
    }

    fn sweeper_running(&self) -> bool {
        self.sweeper.as_ref().is_some_and(|task| !task.is_finished())
    }

    fn requires_sweep(&self) -> bool {
        self.entries
            .values()
            .any(|entry| entry.can_expire() && !entry.is_eviction_scheduled())
    }
}

struct StoreInner {
    /// Re-entrant so a get-or-add resolver may call back into the store.
    /// `RefCell` borrows are never held across user code.
    state: ReentrantMutex<RefCell<StoreState>>,
    evictions: mpsc::UnboundedSender<EvictionTask>,
    runtime: Handle,
    config: CacheConfig,
}

impl Drop for StoreInner {
    fn drop(&mut self) {
        let state = self.state.get_mut().get_mut();
        if let Some(sweeper) = state.sweeper.take() {
            sweeper.abort();
        }
        for (_, entry) in state.entries.drain() {
            entry.release_dependencies();
        }
    }
}

// == Cache Store ==
/// In-process object cache.
///
/// `CacheStore` is a cheap handle: clone it into every component that needs
/// the cache. A single coarse lock guards the map. Removal and dependency
/// teardown run on a background worker so user code never executes while
/// the lock is held, with one exception: the resolver passed to
/// [`CacheStore::get_or_add`] runs inside the lock, which guarantees at most
/// one resolver call per key per miss but blocks every other cache operation
/// until it returns.
#[derive(Clone)]
pub struct CacheStore {
    inner: Arc<StoreInner>,
}

/// Non-owning handle used by background tasks and dependency callbacks.
#[derive(Clone)]
pub(crate) struct WeakCacheStore(Weak<StoreInner>);

impl WeakCacheStore {
    pub(crate) fn upgrade(&self) -> Option<CacheStore> {
        self.0.upgrade().map(|inner| CacheStore { inner })
    }
}

impl fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheStore")
            .field("config", &self.inner.config)
            .field("entries", &self.len())
            .finish()
    }
}

impl CacheStore {
    // == Constructors ==
    /// Creates a store bound to the current tokio runtime.
    ///
    /// Fails with [`CacheError::NoRuntime`] outside a runtime; use
    /// [`CacheStore::with_runtime`] from plain threads.
    pub fn new(config: CacheConfig) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|e| CacheError::NoRuntime(e.to_string()))?;
        Ok(Self::with_runtime(config, runtime))
    }

    /// Creates a store whose sweeper and eviction worker run on `runtime`.
    pub fn with_runtime(config: CacheConfig, runtime: Handle) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let inner = Arc::new_cyclic(|weak: &Weak<StoreInner>| {
            spawn_eviction_worker(&runtime, WeakCacheStore(weak.clone()), rx);
            StoreInner {
                state: ReentrantMutex::new(RefCell::new(StoreState {
                    entries: HashMap::new(),
                    sweeper: None,
                    stats: CacheStats::new(),
                })),
                evictions: tx,
                runtime,
                config,
            }
        });
        debug!(config = ?inner.config, "Cache store created");
        Self { inner }
    }

    pub(crate) fn downgrade(&self) -> WeakCacheStore {
        WeakCacheStore(Arc::downgrade(&self.inner))
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    // == Add ==
    /// Inserts `value` under `key` unless a live entry already exists.
    ///
    /// Returns `true` if inserted. An existing live entry is left untouched
    /// and `false` is returned; an existing expired entry that has not been
    /// swept yet is replaced. Dependencies are started before insertion.
    pub fn add<T>(&self, key: &str, value: T, options: EntryOptions) -> Result<bool>
    where
        T: Any + Send + Sync,
    {
        let cache_key = CacheKey::new(key, options.group.as_deref())?;
        options.expiration.validate()?;
        self.insert(
            cache_key,
            Arc::new(value),
            options.expiration,
            options.dependencies,
            Utc::now(),
        )
    }

    fn insert(
        &self,
        key: CacheKey,
        value: CacheValue,
        expiration: Expiration,
        dependencies: Vec<Arc<dyn Dependency>>,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        if self.live_entry(&key, now).is_some() {
            debug!(key = %key, "Entry already present, add ignored");
            return Ok(false);
        }

        let entry = Arc::new(CacheEntry::new(key.clone(), value, expiration, dependencies, now));
        let store = self.downgrade();
        entry.start_dependencies(move |entry| {
            if let Some(store) = store.upgrade() {
                store.schedule_eviction(entry, EvictionReason::DependencyChanged);
            }
        })?;

        // Liveness is judged outside the lock, then confirmed by identity.
        let replaced = loop {
            let current = self.current_entry(&key);
            if current.as_ref().is_some_and(|c| !c.has_expired(now)) {
                debug!(key = %key, "Entry added concurrently, add ignored");
                self.dispatch(EvictionTask::Release(vec![entry]));
                return Ok(false);
            }

            let guard = self.inner.state.lock();
            let mut state = guard.borrow_mut();
            let unchanged = match (state.entries.get(&key), &current) {
                (Some(present), Some(seen)) => Arc::ptr_eq(present, seen),
                (None, None) => true,
                _ => false,
            };
            if !unchanged {
                continue;
            }

            let replaced = state.entries.insert(key.clone(), Arc::clone(&entry));
            if let Some(old) = &replaced {
                state.stats.record_eviction(old.expiry_reason());
            }
            state.sync_total();
            if entry.can_expire() {
                self.ensure_sweeper(&mut state);
            }
            break replaced;
        };

        if let Some(old) = replaced {
            self.dispatch(EvictionTask::Release(vec![old]));
        }
        // The dependency fired before the entry reached the map, so the
        // queued eviction may already have missed it.
        if entry.is_eviction_scheduled() {
            self.dispatch(EvictionTask::Evict {
                entry: Arc::clone(&entry),
                reason: EvictionReason::DependencyChanged,
            });
        }

        debug!(key = %key, expiration = ?expiration, "Entry added");
        Ok(true)
    }

    fn ensure_sweeper(&self, state: &mut StoreState) {
        if state.sweeper_running() {
            return;
        }
        let interval = self.inner.config.sweep_interval;
        state.sweeper = Some(spawn_expiration_sweeper(
            &self.inner.runtime,
            self.downgrade(),
            interval,
        ));
        info!(interval = ?interval, "Expiration sweeper started");
    }

    // == Get ==
    /// Returns a clone of the value stored under `key`, or `None` on a miss.
    ///
    /// A hit refreshes the entry's sliding window. An expired entry is
    /// reported as a miss and queued for removal.
    pub fn try_get<T>(&self, key: &str, group: Option<&str>) -> Result<Option<T>>
    where
        T: Any + Clone,
    {
        let cache_key = CacheKey::new(key, group)?;
        self.read_entry(&cache_key, Utc::now())
            .map(|entry| downcast_value(&cache_key, entry.value()))
            .transpose()
    }

    /// Like [`CacheStore::try_get`] but returns `T::default()` on a miss.
    pub fn get<T>(&self, key: &str, group: Option<&str>) -> Result<T>
    where
        T: Any + Clone + Default,
    {
        Ok(self.try_get(key, group)?.unwrap_or_default())
    }

    /// Reads the entry itself, with the same hit/miss semantics as `try_get`.
    pub fn get_entry(&self, key: &str, group: Option<&str>) -> Result<Option<Arc<CacheEntry>>> {
        let cache_key = CacheKey::new(key, group)?;
        Ok(self.read_entry(&cache_key, Utc::now()))
    }

    fn read_entry(&self, key: &CacheKey, now: DateTime<Utc>) -> Option<Arc<CacheEntry>> {
        let live = match self.current_entry(key) {
            Some(entry) if !entry.has_expired(now) => {
                entry.refresh(now);
                Some(entry)
            }
            Some(entry) => {
                self.schedule_eviction(&entry, entry.expiry_reason());
                None
            }
            None => None,
        };

        let guard = self.inner.state.lock();
        let mut state = guard.borrow_mut();
        if live.is_some() {
            state.stats.record_hit();
        } else {
            state.stats.record_miss();
        }
        live
    }

    /// Looks up a live entry without refreshing it or touching statistics.
    fn live_entry(&self, key: &CacheKey, now: DateTime<Utc>) -> Option<Arc<CacheEntry>> {
        let entry = self.current_entry(key)?;
        if entry.has_expired(now) {
            self.schedule_eviction(&entry, entry.expiry_reason());
            return None;
        }
        Some(entry)
    }

    /// Clones the mapped entry out under a short lock. Expiry checks may poll
    /// dependencies, which can run their teardown, so they happen afterwards.
    fn current_entry(&self, key: &CacheKey) -> Option<Arc<CacheEntry>> {
        let guard = self.inner.state.lock();
        let entry = guard.borrow().entries.get(key).cloned();
        entry
    }

    // == Get Or Add ==
    /// Returns the cached value for `key`, computing and inserting it with
    /// `resolver` on a miss.
    ///
    /// The store lock is held while `resolver` runs, so concurrent callers
    /// for the same key observe exactly one resolver invocation and the same
    /// value. The lock is re-entrant: the resolver may use this store.
    pub fn get_or_add<T, F>(&self, key: &str, options: EntryOptions, resolver: F) -> Result<T>
    where
        T: Any + Clone + Send + Sync,
        F: FnOnce() -> T,
    {
        self.resolve(key, options, || Ok::<T, CacheError>(resolver()), |_| Vec::new())
    }

    /// Like [`CacheStore::get_or_add`]; `dependency_resolver` derives the
    /// entry's dependencies from the freshly computed value.
    pub fn get_or_add_with_dependencies<T, F, D>(
        &self,
        key: &str,
        options: EntryOptions,
        resolver: F,
        dependency_resolver: D,
    ) -> Result<T>
    where
        T: Any + Clone + Send + Sync,
        F: FnOnce() -> T,
        D: FnOnce(&T) -> Vec<Arc<dyn Dependency>>,
    {
        self.resolve(
            key,
            options,
            || Ok::<T, CacheError>(resolver()),
            dependency_resolver,
        )
    }

    /// Like [`CacheStore::get_or_add`] with a fallible resolver. On error
    /// nothing is cached and the error is returned.
    pub fn try_get_or_add<T, E, F>(
        &self,
        key: &str,
        options: EntryOptions,
        resolver: F,
    ) -> std::result::Result<T, E>
    where
        T: Any + Clone + Send + Sync,
        E: From<CacheError>,
        F: FnOnce() -> std::result::Result<T, E>,
    {
        self.resolve(key, options, resolver, |_| Vec::new())
    }

    fn resolve<T, E, F, D>(
        &self,
        key: &str,
        options: EntryOptions,
        resolver: F,
        dependency_resolver: D,
    ) -> std::result::Result<T, E>
    where
        T: Any + Clone + Send + Sync,
        E: From<CacheError>,
        F: FnOnce() -> std::result::Result<T, E>,
        D: FnOnce(&T) -> Vec<Arc<dyn Dependency>>,
    {
        let cache_key = CacheKey::new(key, options.group.as_deref())?;
        options.expiration.validate()?;

        let _guard = self.inner.state.lock();
        if let Some(entry) = self.read_entry(&cache_key, Utc::now()) {
            return Ok(downcast_value(&cache_key, entry.value())?);
        }

        debug!(key = %cache_key, "Cache miss, invoking resolver");
        let value = resolver()?;
        let mut dependencies = options.dependencies;
        dependencies.extend(dependency_resolver(&value));
        let added = self.insert(
            cache_key.clone(),
            Arc::new(value.clone()),
            options.expiration,
            dependencies,
            Utc::now(),
        )?;
        if !added {
            // The resolver stored this key itself; hand back what the cache holds.
            if let Some(entry) = self.live_entry(&cache_key, Utc::now()) {
                return Ok(downcast_value(&cache_key, entry.value())?);
            }
        }
        Ok(value)
    }

    // == Remove ==
    /// Removes the entry under `key`. Returns `false` if there was none.
    pub fn remove(&self, key: &str, group: Option<&str>) -> Result<bool> {
        let cache_key = CacheKey::new(key, group)?;
        let removed = {
            let guard = self.inner.state.lock();
            let mut state = guard.borrow_mut();
            let removed = state.entries.remove(&cache_key);
            if removed.is_some() {
                state.stats.record_removals(1);
                state.sync_total();
            }
            removed
        };

        match removed {
            Some(entry) => {
                debug!(key = %cache_key, "Entry removed");
                self.dispatch(EvictionTask::Release(vec![entry]));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    // == Clear ==
    /// Removes every entry, or every entry of `group`. Returns how many were
    /// removed.
    pub fn clear(&self, group: Option<&str>) -> usize {
        let removed = {
            let guard = self.inner.state.lock();
            let mut state = guard.borrow_mut();
            let mut removed = Vec::new();
            state.entries.retain(|key, entry| {
                if key.matches_group(group) {
                    removed.push(Arc::clone(entry));
                    false
                } else {
                    true
                }
            });
            state.stats.record_removals(removed.len());
            state.sync_total();
            removed
        };

        let count = removed.len();
        if count > 0 {
            info!(group = ?group, count, "Cache cleared");
            self.dispatch(EvictionTask::Release(removed));
        }
        count
    }

    // == Count / Contains ==
    /// Number of live entries, optionally restricted to `group`.
    pub fn count(&self, group: Option<&str>) -> usize {
        self.live_entries(group, Utc::now()).len()
    }

    /// True if a live entry exists under `key`. Does not refresh the entry.
    pub fn contains_key(&self, key: &str, group: Option<&str>) -> Result<bool> {
        let cache_key = CacheKey::new(key, group)?;
        Ok(self.live_entry(&cache_key, Utc::now()).is_some())
    }

    /// Number of entries in the map, including expired entries not yet swept.
    pub fn len(&self) -> usize {
        let guard = self.inner.state.lock();
        let len = guard.borrow().entries.len();
        len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn live_entries(&self, group: Option<&str>, now: DateTime<Utc>) -> Vec<Arc<CacheEntry>> {
        let candidates: Vec<Arc<CacheEntry>> = {
            let guard = self.inner.state.lock();
            let state = guard.borrow();
            let candidates = state
                .entries
                .iter()
                .filter(|(key, _)| key.matches_group(group))
                .map(|(_, entry)| Arc::clone(entry))
                .collect();
            candidates
        };

        let mut live = Vec::with_capacity(candidates.len());
        for entry in candidates {
            if entry.has_expired(now) {
                self.schedule_eviction(&entry, entry.expiry_reason());
            } else {
                live.push(entry);
            }
        }
        live
    }

    // == Snapshot ==
    /// Captures the live `(key, value)` pairs at call time.
    ///
    /// The snapshot is finite and may be iterated any number of times; later
    /// changes to the store are not reflected in it.
    pub fn snapshot(&self) -> CacheSnapshot {
        let items = self
            .live_entries(None, Utc::now())
            .into_iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect();
        CacheSnapshot { items }
    }

    // == Stats ==
    /// Returns current cache statistics.
    pub fn stats(&self) -> CacheStats {
        let guard = self.inner.state.lock();
        let stats = guard.borrow().stats.clone();
        stats
    }

    /// True while the background expiration sweep is scheduled.
    pub fn is_sweeper_running(&self) -> bool {
        let guard = self.inner.state.lock();
        let running = guard.borrow().sweeper_running();
        running
    }

    // == Shutdown ==
    /// Stops the sweep and releases every entry's dependencies.
    ///
    /// The store stays usable afterwards; a later expirable insert restarts
    /// the sweep.
    pub fn shutdown(&self) {
        let (sweeper, entries) = {
            let guard = self.inner.state.lock();
            let mut state = guard.borrow_mut();
            let sweeper = state.sweeper.take();
            let entries: Vec<Arc<CacheEntry>> =
                state.entries.drain().map(|(_, entry)| entry).collect();
            state.sync_total();
            (sweeper, entries)
        };

        if let Some(sweeper) = sweeper {
            sweeper.abort();
        }
        for entry in &entries {
            entry.release_dependencies();
        }
        info!(released = entries.len(), "Cache store shut down");
    }

    // == Background Support ==
    /// Evaluates every expirable entry and queues the expired ones for removal.
    /// The lock is only held while the snapshot is taken.
    pub(crate) fn sweep_expired(&self, now: DateTime<Utc>) -> SweepReport {
        let candidates: Vec<Arc<CacheEntry>> = {
            let guard = self.inner.state.lock();
            let state = guard.borrow();
            let candidates = state
                .entries
                .values()
                .filter(|entry| entry.can_expire() && !entry.is_eviction_scheduled())
                .cloned()
                .collect();
            candidates
        };

        let mut report = SweepReport {
            scanned: candidates.len(),
            ..SweepReport::default()
        };
        for entry in candidates {
            if entry.has_expired(now) {
                self.schedule_eviction(&entry, entry.expiry_reason());
                report.scheduled += 1;
            } else {
                report.still_required = true;
            }
        }
        report
    }

    /// Discards the sweeper handle if no entry needs sweeping. Returns `true`
    /// if the calling sweeper should exit.
    pub(crate) fn stop_sweeper_if_idle(&self) -> bool {
        let guard = self.inner.state.lock();
        let mut state = guard.borrow_mut();
        if state.requires_sweep() {
            return false;
        }
        state.sweeper = None;
        true
    }

    fn schedule_eviction(&self, entry: &Arc<CacheEntry>, reason: EvictionReason) {
        if entry.mark_eviction_scheduled() {
            self.dispatch(EvictionTask::Evict {
                entry: Arc::clone(entry),
                reason,
            });
        }
    }

    fn dispatch(&self, task: EvictionTask) {
        if let Err(err) = self.inner.evictions.send(task) {
            warn!("Eviction worker unavailable, running eviction inline");
            self.run_eviction_task(err.0);
        }
    }

    /// Applies an eviction task; called by the eviction worker.
    pub(crate) fn run_eviction_task(&self, task: EvictionTask) {
        match task {
            EvictionTask::Evict { entry, reason } => {
                let removed = {
                    let guard = self.inner.state.lock();
                    let mut state = guard.borrow_mut();
                    let is_current = state
                        .entries
                        .get(entry.key())
                        .is_some_and(|current| Arc::ptr_eq(current, &entry));
                    if is_current {
                        state.entries.remove(entry.key());
                        state.stats.record_eviction(reason);
                        state.sync_total();
                    }
                    is_current
                };
                entry.release_dependencies();
                if removed {
                    debug!(key = %entry.key(), reason = ?reason, "Entry evicted");
                }
            }
            EvictionTask::Release(entries) => {
                for entry in entries {
                    entry.release_dependencies();
                }
            }
        }
    }
}

fn downcast_value<T>(key: &CacheKey, value: &CacheValue) -> Result<T>
where
    T: Any + Clone,
{
    value
        .as_ref()
        .downcast_ref::<T>()
        .cloned()
        .ok_or_else(|| CacheError::TypeMismatch {
            key: key.to_string(),
            expected: type_name::<T>(),
        })
}

// == Cache Snapshot ==
/// Point-in-time copy of the live entries, produced by [`CacheStore::snapshot`].
#[derive(Debug, Clone, Default)]
pub struct CacheSnapshot {
    items: Vec<(CacheKey, CacheValue)>,
}

impl CacheSnapshot {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Iterates the captured pairs; may be called repeatedly.
    pub fn iter(&self) -> std::slice::Iter<'_, (CacheKey, CacheValue)> {
        self.items.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &CacheKey> {
        self.items.iter().map(|(key, _)| key)
    }
}

impl IntoIterator for CacheSnapshot {
    type Item = (CacheKey, CacheValue);
    type IntoIter = std::vec::IntoIter<(CacheKey, CacheValue)>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a> IntoIterator for &'a CacheSnapshot {
    type Item = &'a (CacheKey, CacheValue);
    type IntoIter = std::slice::Iter<'a, (CacheKey, CacheValue)>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}
