//! Entry Options Module
//!
//! Expiration policy and per-entry settings supplied to `add` and `get_or_add`.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::dependency::Dependency;
use crate::error::{CacheError, Result};

/// Longest sliding window accepted by the store (365 days).
pub const MAX_SLIDING_EXPIRATION: Duration = Duration::from_secs(365 * 24 * 60 * 60);

// == Expiration ==
/// Timing policy of an entry. Absolute and sliding expiration are
/// alternatives; dependencies combine with either.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Expiration {
    /// The entry only leaves the store when removed or invalidated
    #[default]
    Never,
    /// Expires at a fixed UTC instant
    Absolute(DateTime<Utc>),
    /// Expires after this much time without a successful read
    Sliding(Duration),
}

impl Expiration {
    /// Checks that a sliding window lies within `(0, 365 days]`.
    pub fn validate(&self) -> Result<()> {
        match self {
            Expiration::Sliding(window)
                if window.is_zero() || *window > MAX_SLIDING_EXPIRATION =>
            {
                Err(CacheError::OutOfRange(format!(
                    "Sliding expiration must be greater than zero and at most 365 days, got {:?}",
                    window
                )))
            }
            _ => Ok(()),
        }
    }

    /// Returns true unless the policy is [`Expiration::Never`].
    pub fn is_timed(&self) -> bool {
        !matches!(self, Expiration::Never)
    }
}

// == Entry Options ==
/// Options for inserting an entry.
///
/// ```ignore
/// let options = EntryOptions::new()
///     .in_group("users")
///     .sliding(Duration::from_secs(300))
///     .with_dependency(Arc::new(FileDependency::new("users.json")));
/// ```
#[derive(Debug, Clone, Default)]
pub struct EntryOptions {
    pub(crate) group: Option<String>,
    pub(crate) expiration: Expiration,
    pub(crate) dependencies: Vec<Arc<dyn Dependency>>,
}

impl EntryOptions {
    /// Ungrouped, never-expiring, no dependencies.
    pub fn new() -> Self {
        Self::default()
    }

    /// Places the entry in `group`.
    #[must_use]
    pub fn in_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    /// Sets an optional group.
    #[must_use]
    pub fn group_opt(mut self, group: Option<String>) -> Self {
        self.group = group;
        self
    }

    /// Expires the entry at `at`. Replaces any sliding window.
    #[must_use]
    pub fn absolute(self, at: DateTime<Utc>) -> Self {
        self.expiration(Expiration::Absolute(at))
    }

    /// Expires the entry after `window` without reads. Replaces any absolute
    /// expiration.
    #[must_use]
    pub fn sliding(self, window: Duration) -> Self {
        self.expiration(Expiration::Sliding(window))
    }

    /// Sets the expiration policy.
    #[must_use]
    pub fn expiration(mut self, expiration: Expiration) -> Self {
        self.expiration = expiration;
        self
    }

    /// Adds a dependency whose change invalidates the entry.
    #[must_use]
    pub fn with_dependency(mut self, dependency: Arc<dyn Dependency>) -> Self {
        self.dependencies.push(dependency);
        self
    }

    /// Adds several dependencies.
    #[must_use]
    pub fn with_dependencies<I>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn Dependency>>,
    {
        self.dependencies.extend(dependencies);
        self
    }

    /// The group, if any.
    pub fn group(&self) -> Option<&str> {
        self.group.as_deref()
    }

    /// The expiration policy.
    pub fn expiration_policy(&self) -> Expiration {
        self.expiration
    }
}
