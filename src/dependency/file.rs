//! File Dependency
//!
//! Invalidates a cache entry when any of a set of files is created,
//! modified, or removed.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use tracing::{debug, warn};

use super::{ChangeSignal, Dependency};
use crate::error::{CacheError, Result};

/// Watches one or more files and raises a change when any of them mutates.
///
/// Change is detected two ways: filesystem events delivered by `notify`, and
/// a modification-time comparison performed by [`Dependency::has_changed`]
/// for platforms where events are coalesced or dropped.
pub struct FileDependency {
    paths: Vec<PathBuf>,
    signal: Arc<ChangeSignal>,
    /// Resolved paths and the modification time observed at `start`
    baseline: Mutex<Vec<(PathBuf, Option<SystemTime>)>>,
    watcher: Mutex<Option<RecommendedWatcher>>,
}

impl std::fmt::Debug for FileDependency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileDependency")
            .field("paths", &self.paths)
            .field("changed", &self.signal.has_fired())
            .field("watching", &self.watcher.lock().is_some())
            .finish()
    }
}

impl FileDependency {
    /// Creates a dependency on a single file.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_paths([path.into()])
    }

    /// Creates a dependency on several files; a change to any one of them
    /// invalidates the entry.
    pub fn with_paths<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            paths: paths.into_iter().map(Into::into).collect(),
            signal: Arc::new(ChangeSignal::new()),
            baseline: Mutex::new(Vec::new()),
            watcher: Mutex::new(None),
        }
    }

    /// The watched paths as supplied by the caller.
    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    /// Returns true while a filesystem watcher is active.
    pub fn is_watching(&self) -> bool {
        self.watcher.lock().is_some()
    }
}

impl Dependency for FileDependency {
    fn start(&self) -> Result<()> {
        if self.paths.is_empty() {
            return Err(CacheError::InvalidArgument(
                "File dependency requires at least one path".to_string(),
            ));
        }

        let resolved = self
            .paths
            .iter()
            .map(|path| resolve_path(path))
            .collect::<Result<Vec<_>>>()?;

        let signal = Arc::clone(&self.signal);
        let targets = resolved.clone();
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    let is_target = event.paths.iter().any(|p| targets.contains(p));
                    if is_target && is_change_event(&event.kind) {
                        debug!(paths = ?event.paths, kind = ?event.kind, "Watched file changed");
                        signal.notify();
                    }
                }
                Err(e) => warn!("File watcher error: {}", e),
            },
            Config::default(),
        )?;

        // Watch the parent directory so replacement via rename is observed.
        let mut directories: Vec<&Path> = resolved
            .iter()
            .filter_map(|path| path.parent())
            .collect();
        directories.sort();
        directories.dedup();
        for directory in directories {
            watcher.watch(directory, RecursiveMode::NonRecursive)?;
        }

        *self.baseline.lock() = resolved
            .into_iter()
            .map(|path| {
                let modified = modified_time(&path);
                (path, modified)
            })
            .collect();
        *self.watcher.lock() = Some(watcher);

        debug!(paths = ?self.paths, "File dependency started");
        Ok(())
    }

    fn has_changed(&self) -> bool {
        if self.signal.has_fired() {
            return true;
        }

        let changed = self
            .baseline
            .lock()
            .iter()
            .any(|(path, modified)| modified_time(path) != *modified);
        if changed {
            self.signal.notify();
        }
        changed
    }

    fn on_changed(&self) -> &ChangeSignal {
        &self.signal
    }

    fn dispose(&self) {
        if self.watcher.lock().take().is_some() {
            debug!(paths = ?self.paths, "File dependency disposed");
        }
    }
}

/// Resolves a path against its canonical parent directory so it compares
/// equal to the paths `notify` reports.
fn resolve_path(path: &Path) -> Result<PathBuf> {
    let file_name = path.file_name().ok_or_else(|| {
        CacheError::InvalidArgument(format!("Not a file path: {}", path.display()))
    })?;
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let parent = parent.canonicalize().map_err(|e| {
        CacheError::Dependency(format!("Cannot watch {}: {}", parent.display(), e))
    })?;
    Ok(parent.join(file_name))
}

fn modified_time(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

fn is_change_event(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    )
}
