//! Request DTOs for the admin API
//!
//! Defines the structure of incoming HTTP request bodies and query strings.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::cache::{EntryOptions, Expiration};
use crate::dependency::FileDependency;

/// Longest key accepted over HTTP.
const MAX_KEY_LENGTH: usize = 256;

/// Request body for adding an entry (PUT /entries)
///
/// # Fields
/// - `key`: The cache key
/// - `group`: Optional group namespace
/// - `value`: Arbitrary JSON value to store
/// - `absolute_expiration`: RFC 3339 instant at which the entry expires
/// - `sliding_expiration_ms`: Idle window in milliseconds
/// - `watch_paths`: Files whose change invalidates the entry
#[derive(Debug, Clone, Deserialize)]
pub struct AddEntryRequest {
    pub key: String,
    #[serde(default)]
    pub group: Option<String>,
    pub value: serde_json::Value,
    #[serde(default)]
    pub absolute_expiration: Option<DateTime<Utc>>,
    #[serde(default)]
    pub sliding_expiration_ms: Option<u64>,
    #[serde(default)]
    pub watch_paths: Vec<PathBuf>,
}

impl AddEntryRequest {
    /// Validates the request data
    ///
    /// Returns an error message if validation fails, None if valid.
    /// Range checks on the sliding window are left to the store.
    pub fn validate(&self) -> Option<String> {
        if self.key.is_empty() {
            return Some("Key cannot be empty".to_string());
        }
        if self.key.len() > MAX_KEY_LENGTH {
            return Some(format!(
                "Key exceeds maximum length of {} characters",
                MAX_KEY_LENGTH
            ));
        }
        if self.absolute_expiration.is_some() && self.sliding_expiration_ms.is_some() {
            return Some(
                "absolute_expiration and sliding_expiration_ms are mutually exclusive".to_string(),
            );
        }
        None
    }

    /// Builds store options; watched paths become one file dependency.
    pub fn to_options(&self) -> EntryOptions {
        let expiration = match (self.absolute_expiration, self.sliding_expiration_ms) {
            (Some(at), _) => Expiration::Absolute(at),
            (None, Some(ms)) => Expiration::Sliding(Duration::from_millis(ms)),
            (None, None) => Expiration::Never,
        };

        let mut options = EntryOptions::new()
            .group_opt(self.group.clone())
            .expiration(expiration);
        if !self.watch_paths.is_empty() {
            options =
                options.with_dependency(Arc::new(FileDependency::with_paths(self.watch_paths.clone())));
        }
        options
    }
}

/// Optional `?group=` query parameter.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GroupQuery {
    #[serde(default)]
    pub group: Option<String>,
}

impl GroupQuery {
    pub fn group(&self) -> Option<&str> {
        self.group.as_deref()
    }
}
