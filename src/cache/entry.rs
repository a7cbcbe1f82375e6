//! Cache Entry Module
//!
//! Defines a stored value together with its expiration policy, its
//! dependencies, and its access timestamps.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::{debug, error};

use crate::cache::{CacheKey, Expiration};
use crate::dependency::{panic_message, Dependency, SubscriptionId};
use crate::error::Result;

/// A type-erased cached value.
pub type CacheValue = Arc<dyn Any + Send + Sync>;

/// Why an entry left the store without an explicit remove.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionReason {
    /// Absolute or sliding expiration elapsed
    Expired,
    /// A dependency reported a change
    DependencyChanged,
}

// == Cache Entry ==
/// A single cache entry.
///
/// Entries are shared behind `Arc` so the sweeper can evaluate a snapshot
/// without holding the store lock.
pub struct CacheEntry {
    key: CacheKey,
    value: CacheValue,
    expiration: Expiration,
    dependencies: Vec<Arc<dyn Dependency>>,
    /// (index into `dependencies`, subscription) pairs still attached
    subscriptions: Mutex<Vec<(usize, SubscriptionId)>>,
    created: DateTime<Utc>,
    last_accessed: Mutex<DateTime<Utc>>,
    started: AtomicBool,
    dependency_changed: AtomicBool,
    expired_raised: AtomicBool,
    released: AtomicBool,
    eviction_scheduled: AtomicBool,
}

impl std::fmt::Debug for CacheEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheEntry")
            .field("key", &self.key)
            .field("expiration", &self.expiration)
            .field("dependencies", &self.dependencies)
            .field("created", &self.created)
            .field("last_accessed", &self.last_accessed())
            .finish_non_exhaustive()
    }
}

impl CacheEntry {
    // == Constructor ==
    /// Creates an entry; `now` becomes both its creation and last-access time.
    pub fn new(
        key: CacheKey,
        value: CacheValue,
        expiration: Expiration,
        dependencies: Vec<Arc<dyn Dependency>>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            key,
            value,
            expiration,
            dependencies,
            subscriptions: Mutex::new(Vec::new()),
            created: now,
            last_accessed: Mutex::new(now),
            started: AtomicBool::new(false),
            dependency_changed: AtomicBool::new(false),
            expired_raised: AtomicBool::new(false),
            released: AtomicBool::new(false),
            eviction_scheduled: AtomicBool::new(false),
        }
    }

    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    pub fn value(&self) -> &CacheValue {
        &self.value
    }

    pub fn expiration(&self) -> Expiration {
        self.expiration
    }

    pub fn created(&self) -> DateTime<Utc> {
        self.created
    }

    pub fn last_accessed(&self) -> DateTime<Utc> {
        *self.last_accessed.lock()
    }

    pub fn dependencies(&self) -> &[Arc<dyn Dependency>] {
        &self.dependencies
    }

    // == Can Expire ==
    /// True if the entry has a timed expiration or at least one dependency.
    pub fn can_expire(&self) -> bool {
        self.expiration.is_timed() || !self.dependencies.is_empty()
    }

    // == Has Expired ==
    /// Checks whether the entry has expired at `now`.
    ///
    /// A dependency that already fired expires the entry in every mode.
    /// Otherwise the timing mode decides; only a dependency-only entry polls
    /// its dependencies. Boundaries are inclusive: an entry is expired once
    /// `now` reaches the absolute instant or the full sliding window.
    pub fn has_expired(&self, now: DateTime<Utc>) -> bool {
        if !self.can_expire() {
            return false;
        }
        if self.dependency_changed.load(Ordering::Acquire) {
            return true;
        }

        match self.expiration {
            Expiration::Absolute(at) => now >= at,
            Expiration::Sliding(window) => self.idle_for(now) >= window,
            Expiration::Never => self.dependencies.iter().any(|d| d.has_changed()),
        }
    }

    /// Why this entry is considered expired.
    pub fn expiry_reason(&self) -> EvictionReason {
        if self.dependency_changed.load(Ordering::Acquire) || !self.expiration.is_timed() {
            EvictionReason::DependencyChanged
        } else {
            EvictionReason::Expired
        }
    }

    // == Refresh ==
    /// Records a successful read at `now`, restarting any sliding window.
    pub fn refresh(&self, now: DateTime<Utc>) {
        let mut last = self.last_accessed.lock();
        if now > *last {
            *last = now;
        }
    }

    fn idle_for(&self, now: DateTime<Utc>) -> Duration {
        now.signed_duration_since(self.last_accessed())
            .to_std()
            .unwrap_or(Duration::ZERO)
    }

    // == Dependencies ==
    /// Subscribes to every dependency, then starts each one.
    ///
    /// `on_expired` is raised at most once, on the thread that delivered the
    /// first change notification; the dependencies are released right after.
    /// Calling this more than once has no effect. If a dependency fails to
    /// start, all dependencies are released and the error is returned.
    pub fn start_dependencies<F>(self: &Arc<Self>, on_expired: F) -> Result<()>
    where
        F: Fn(&Arc<CacheEntry>) + Send + Sync + 'static,
    {
        if self.dependencies.is_empty() || self.started.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let on_expired = Arc::new(on_expired);
        for (index, dependency) in self.dependencies.iter().enumerate() {
            let entry = Arc::downgrade(self);
            let callback = Arc::clone(&on_expired);
            let id = dependency.on_changed().subscribe(move || {
                if let Some(entry) = entry.upgrade() {
                    entry.dependency_fired(|e| callback(e));
                }
            });
            self.subscriptions.lock().push((index, id));
        }

        // A dependency may have fired while we were still subscribing.
        if self.released.load(Ordering::Acquire) {
            self.detach_subscriptions();
            return Ok(());
        }

        for dependency in &self.dependencies {
            if let Err(e) = dependency.start() {
                self.release_dependencies();
                return Err(e);
            }
        }

        if self.dependencies.iter().any(|d| d.on_changed().has_fired()) {
            self.dependency_fired(|e| on_expired(e));
        }

        debug!(key = %self.key, count = self.dependencies.len(), "Entry dependencies started");
        Ok(())
    }

    fn dependency_fired(self: &Arc<Self>, on_expired: impl FnOnce(&Arc<CacheEntry>)) {
        self.dependency_changed.store(true, Ordering::Release);
        if !self.expired_raised.swap(true, Ordering::AcqRel) {
            debug!(key = %self.key, "Entry dependency changed");
            on_expired(self);
        }
        self.release_dependencies();
    }

    /// Unsubscribes from and disposes every dependency. Disposal happens at
    /// most once no matter how many removal paths call this.
    pub fn release_dependencies(&self) {
        let first = !self.released.swap(true, Ordering::AcqRel);
        self.detach_subscriptions();
        if !first {
            return;
        }

        for dependency in &self.dependencies {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| dependency.dispose())) {
                error!(
                    key = %self.key,
                    reason = %panic_message(payload.as_ref()),
                    "Dependency dispose panicked"
                );
            }
        }
    }

    fn detach_subscriptions(&self) {
        let subscriptions = std::mem::take(&mut *self.subscriptions.lock());
        for (index, id) in subscriptions {
            self.dependencies[index].on_changed().unsubscribe(id);
        }
    }

    /// True once the dependencies have been released.
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    /// Marks the entry as queued for eviction. Returns `false` if it already was.
    pub(crate) fn mark_eviction_scheduled(&self) -> bool {
        !self.eviction_scheduled.swap(true, Ordering::AcqRel)
    }

    pub(crate) fn is_eviction_scheduled(&self) -> bool {
        self.eviction_scheduled.load(Ordering::Acquire)
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::dependency::ManualDependency;
    use chrono::TimeDelta;
    use std::sync::atomic::AtomicUsize;

    fn entry_with(expiration: Expiration, dependencies: Vec<Arc<dyn Dependency>>) -> Arc<CacheEntry> {
        Arc::new(CacheEntry::new(
            CacheKey::new("key", None).unwrap(),
            Arc::new(42_u32),
            expiration,
            dependencies,
            Utc::now(),
        ))
    }

    #[test]
    fn test_entry_without_policy_never_expires() {
        let entry = entry_with(Expiration::Never, Vec::new());
        assert!(!entry.can_expire());
        assert!(!entry.has_expired(Utc::now() + TimeDelta::days(10_000)));
        assert_eq!(entry.value().downcast_ref::<u32>(), Some(&42));
    }

    #[test]
    fn test_absolute_expiration_boundary() {
        let at = Utc::now() + TimeDelta::seconds(10);
        let entry = entry_with(Expiration::Absolute(at), Vec::new());

        assert!(entry.can_expire());
        assert!(!entry.has_expired(at - TimeDelta::milliseconds(1)));
        assert!(entry.has_expired(at), "Entry should be expired at boundary");
        assert!(entry.has_expired(at + TimeDelta::seconds(1)));
        assert_eq!(entry.expiry_reason(), EvictionReason::Expired);
    }

    #[test]
    fn test_sliding_expiration_resets_on_refresh() {
        let entry = entry_with(Expiration::Sliding(Duration::from_secs(60)), Vec::new());
        let start = entry.last_accessed();

        assert!(!entry.has_expired(start + TimeDelta::seconds(59)));
        assert!(entry.has_expired(start + TimeDelta::seconds(60)));

        entry.refresh(start + TimeDelta::seconds(50));
        assert!(!entry.has_expired(start + TimeDelta::seconds(100)));
        assert!(entry.has_expired(start + TimeDelta::seconds(110)));
    }

    #[test]
    fn test_refresh_never_moves_backwards() {
        let entry = entry_with(Expiration::Sliding(Duration::from_secs(1)), Vec::new());
        let accessed = entry.last_accessed();
        entry.refresh(accessed - TimeDelta::seconds(5));
        assert_eq!(entry.last_accessed(), accessed);
    }

    #[test]
    fn test_dependency_mode_polls_has_changed() {
        let dependency = Arc::new(ManualDependency::new());
        let entry = entry_with(Expiration::Never, vec![dependency.clone() as Arc<dyn Dependency>]);

        assert!(entry.can_expire());
        assert!(!entry.has_expired(Utc::now()));

        // Not started, so only the poll path can observe this.
        dependency.signal();
        assert!(entry.has_expired(Utc::now()));
        assert_eq!(entry.expiry_reason(), EvictionReason::DependencyChanged);
    }

    #[test]
    fn test_change_raises_expired_once_and_releases() {
        let first = Arc::new(ManualDependency::new());
        let second = Arc::new(ManualDependency::new());
        let entry = entry_with(
            Expiration::Absolute(Utc::now() + TimeDelta::hours(1)),
            vec![
                first.clone() as Arc<dyn Dependency>,
                second.clone() as Arc<dyn Dependency>,
            ],
        );

        let raised = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&raised);
        entry
            .start_dependencies(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        assert!(first.is_started());
        assert!(second.is_started());
        assert_eq!(first.on_changed().listener_count(), 1);

        first.signal();
        second.signal();

        assert_eq!(raised.load(Ordering::SeqCst), 1);
        assert!(entry.is_released());
        assert!(entry.has_expired(Utc::now()));
        assert_eq!(first.dispose_count(), 1);
        assert_eq!(second.dispose_count(), 1);
        assert_eq!(first.on_changed().listener_count(), 0);
        assert_eq!(second.on_changed().listener_count(), 0);
    }

    #[test]
    fn test_release_is_idempotent() {
        let dependency = Arc::new(ManualDependency::new());
        let entry = entry_with(Expiration::Never, vec![dependency.clone() as Arc<dyn Dependency>]);
        entry.start_dependencies(|_| {}).unwrap();

        entry.release_dependencies();
        entry.release_dependencies();

        assert_eq!(dependency.dispose_count(), 1);
        assert_eq!(dependency.on_changed().listener_count(), 0);
    }

    #[test]
    fn test_already_fired_dependency_expires_on_start() {
        let dependency = Arc::new(ManualDependency::new());
        dependency.signal();

        let entry = entry_with(Expiration::Never, vec![dependency.clone() as Arc<dyn Dependency>]);
        let raised = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&raised);
        entry
            .start_dependencies(move |_| flag.store(true, Ordering::SeqCst))
            .unwrap();

        assert!(raised.load(Ordering::SeqCst));
        assert!(entry.is_released());
        assert_eq!(dependency.dispose_count(), 1);
    }

    #[test]
    fn test_eviction_scheduled_once() {
        let entry = entry_with(Expiration::Never, Vec::new());
        assert!(entry.mark_eviction_scheduled());
        assert!(!entry.mark_eviction_scheduled());
        assert!(entry.is_eviction_scheduled());
    }
}
