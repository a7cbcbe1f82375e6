//! Manually signalled dependency.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use tracing::debug;

use super::{ChangeSignal, Dependency};
use crate::error::Result;

/// A dependency that changes when its owner calls [`ManualDependency::signal`].
///
/// Useful for collaborators that already know when their source changed,
/// for example after recomputing a checksum.
#[derive(Debug, Default)]
pub struct ManualDependency {
    signal: ChangeSignal,
    started: AtomicBool,
    dispose_count: AtomicUsize,
}

impl ManualDependency {
    /// Creates an unsignalled dependency.
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the dependency as changed. Returns `false` if it already was.
    pub fn signal(&self) -> bool {
        let fired = self.signal.notify();
        if fired {
            debug!("Manual dependency signalled");
        }
        fired
    }

    /// Returns true once `start` has been called.
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// Returns true once `dispose` has been called.
    pub fn is_disposed(&self) -> bool {
        self.dispose_count() > 0
    }

    /// Number of times `dispose` has been called.
    pub fn dispose_count(&self) -> usize {
        self.dispose_count.load(Ordering::Acquire)
    }
}

impl Dependency for ManualDependency {
    fn start(&self) -> Result<()> {
        self.started.store(true, Ordering::Release);
        Ok(())
    }

    fn has_changed(&self) -> bool {
        self.signal.has_fired()
    }

    fn on_changed(&self) -> &ChangeSignal {
        &self.signal
    }

    fn dispose(&self) {
        self.dispose_count.fetch_add(1, Ordering::AcqRel);
    }
}
