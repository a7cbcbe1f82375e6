//! Polling Dependency
//!
//! Periodically runs a caller-supplied probe on the tokio runtime and raises
//! a change the first time it reports `true`.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::debug;

use super::{ChangeSignal, Dependency};
use crate::error::{CacheError, Result};

type Probe = Arc<dyn Fn() -> bool + Send + Sync>;

/// A dependency backed by a polled predicate.
///
/// The probe runs on a tokio worker, so it must be cheap and non-blocking.
pub struct PollingDependency {
    probe: Probe,
    interval: Duration,
    signal: Arc<ChangeSignal>,
    runtime: Handle,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for PollingDependency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollingDependency")
            .field("interval", &self.interval)
            .field("changed", &self.signal.has_fired())
            .finish()
    }
}

impl PollingDependency {
    /// Creates a polling dependency bound to the current tokio runtime.
    pub fn new<F>(interval: Duration, probe: F) -> Result<Self>
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        let runtime = Handle::try_current().map_err(|e| CacheError::NoRuntime(e.to_string()))?;
        Self::with_runtime(runtime, interval, probe)
    }

    /// Creates a polling dependency that spawns its poll loop on `runtime`.
    pub fn with_runtime<F>(runtime: Handle, interval: Duration, probe: F) -> Result<Self>
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        if interval.is_zero() {
            return Err(CacheError::OutOfRange(
                "Polling interval must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            probe: Arc::new(probe),
            interval,
            signal: Arc::new(ChangeSignal::new()),
            runtime,
            task: Mutex::new(None),
        })
    }

    /// Returns true while the poll loop is running.
    pub fn is_polling(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }
}

impl Dependency for PollingDependency {
    fn start(&self) -> Result<()> {
        let mut task = self.task.lock();
        if task.is_some() {
            return Ok(());
        }

        let probe = Arc::clone(&self.probe);
        let signal = Arc::clone(&self.signal);
        let interval = self.interval;

        *task = Some(self.runtime.spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                if signal.has_fired() {
                    break;
                }
                if probe() {
                    debug!("Polling dependency reported a change");
                    signal.notify();
                    break;
                }
            }
        }));

        Ok(())
    }

    fn has_changed(&self) -> bool {
        if self.signal.has_fired() {
            return true;
        }
        if (self.probe)() {
            self.signal.notify();
            return true;
        }
        false
    }

    fn on_changed(&self) -> &ChangeSignal {
        &self.signal
    }

    fn dispose(&self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
    }
}
