//! Cache Key Module
//!
//! The composite key indexing the store: the literal `(group, key)` pair.

use std::fmt;

use serde::Serialize;

use crate::error::{CacheError, Result};

// == Cache Key ==
/// Identity of a cache entry.
///
/// An empty group is treated as no group, so `Some("")` and `None` address
/// the same entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct CacheKey {
    group: Option<String>,
    key: String,
}

impl CacheKey {
    /// Builds a composite key, rejecting empty keys.
    pub fn new(key: &str, group: Option<&str>) -> Result<Self> {
        if key.is_empty() {
            return Err(CacheError::InvalidArgument(
                "Key cannot be empty".to_string(),
            ));
        }

        Ok(Self {
            group: group.filter(|g| !g.is_empty()).map(str::to_owned),
            key: key.to_owned(),
        })
    }

    /// The caller-supplied key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The group, if any.
    pub fn group(&self) -> Option<&str> {
        self.group.as_deref()
    }

    /// Returns true if this key is selected by `group`; `None` selects all keys.
    pub fn matches_group(&self, group: Option<&str>) -> bool {
        match group.filter(|g| !g.is_empty()) {
            Some(group) => self.group.as_deref() == Some(group),
            None => true,
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.group {
            Some(group) => write!(f, "{}/{}", group, self.key),
            None => f.write_str(&self.key),
        }
    }
}
