//! Dependency Module
//!
//! External change sources that a cache entry can subscribe to. When a
//! dependency reports a change, the entry it belongs to is invalidated and
//! evicted from the store without an explicit remove.

mod file;
mod manual;
mod polling;

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::error;

use crate::error::Result;

pub use file::FileDependency;
pub use manual::ManualDependency;
pub use polling::PollingDependency;

// == Dependency Trait ==
/// An external signal source whose change invalidates a cache entry.
///
/// The owning entry subscribes to [`Dependency::on_changed`] before calling
/// [`Dependency::start`], and calls [`Dependency::dispose`] exactly once when
/// the entry leaves the store.
pub trait Dependency: Send + Sync + fmt::Debug {
    /// Begins monitoring the watched resource.
    fn start(&self) -> Result<()>;

    /// Polls whether the watched resource has changed since `start`.
    fn has_changed(&self) -> bool;

    /// The change event raised when the resource mutates.
    fn on_changed(&self) -> &ChangeSignal;

    /// Stops monitoring and frees any watcher resources.
    fn dispose(&self);
}

/// Listener invoked when a [`ChangeSignal`] fires.
pub type ChangeListener = Arc<dyn Fn() + Send + Sync>;

/// Handle returned by [`ChangeSignal::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

// == Change Signal ==
/// One-shot change event shared by all dependency implementations.
///
/// The signal fires at most once. Listeners run on the thread that calls
/// [`ChangeSignal::notify`]; a panicking listener is logged and does not
/// prevent the remaining listeners from running.
#[derive(Default)]
pub struct ChangeSignal {
    fired: AtomicBool,
    next_id: AtomicU64,
    listeners: Mutex<Vec<(SubscriptionId, ChangeListener)>>,
}

impl ChangeSignal {
    /// Creates a signal that has not fired and has no listeners.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a listener and returns its subscription handle.
    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn() + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.lock().push((id, Arc::new(listener)));
        id
    }

    /// Removes a listener. Returns `false` if it was not subscribed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    /// Returns true once the signal has fired.
    pub fn has_fired(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }

    /// Number of currently subscribed listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }

    /// Fires the signal. Only the first call invokes listeners; later calls
    /// return `false`.
    pub fn notify(&self) -> bool {
        if self.fired.swap(true, Ordering::AcqRel) {
            return false;
        }

        // Listeners may unsubscribe themselves, so run them outside the lock.
        let listeners: Vec<ChangeListener> = self
            .listeners
            .lock()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        for listener in listeners {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| (*listener)())) {
                error!(
                    reason = %panic_message(payload.as_ref()),
                    "Dependency change listener panicked"
                );
            }
        }

        true
    }
}

impl fmt::Debug for ChangeSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeSignal")
            .field("fired", &self.has_fired())
            .field("listeners", &self.listener_count())
            .finish()
    }
}

/// Extracts a readable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
