//! Response DTOs for the admin API
//!
//! Defines the structure of outgoing HTTP response bodies.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::cache::{CacheEntry, CacheStats, Expiration};

/// Response body for PUT /entries
#[derive(Debug, Clone, Serialize)]
pub struct AddEntryResponse {
    /// The key that was submitted
    pub key: String,
    /// Group of the key, if any
    pub group: Option<String>,
    /// False if a live entry already existed and was left untouched
    pub added: bool,
    pub message: String,
}

impl AddEntryResponse {
    pub fn new(key: impl Into<String>, group: Option<String>, added: bool) -> Self {
        let key = key.into();
        let message = if added {
            format!("Key '{}' added", key)
        } else {
            format!("Key '{}' already present", key)
        };
        Self {
            key,
            group,
            added,
            message,
        }
    }
}

/// Response body for GET /entries/:key
#[derive(Debug, Clone, Serialize)]
pub struct GetEntryResponse {
    pub key: String,
    pub group: Option<String>,
    pub value: serde_json::Value,
    pub created: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
    /// Set when the entry expires at a fixed instant
    pub absolute_expiration: Option<DateTime<Utc>>,
    /// Set when the entry uses a sliding window
    pub sliding_expiration_ms: Option<u64>,
    /// Number of dependencies attached to the entry
    pub dependencies: usize,
}

impl GetEntryResponse {
    /// Describes `entry`, whose value has already been read as JSON.
    pub fn from_entry(entry: &CacheEntry, value: serde_json::Value) -> Self {
        let (absolute_expiration, sliding_expiration_ms) = match entry.expiration() {
            Expiration::Absolute(at) => (Some(at), None),
            Expiration::Sliding(window) => (None, Some(window.as_millis() as u64)),
            Expiration::Never => (None, None),
        };
        Self {
            key: entry.key().key().to_string(),
            group: entry.key().group().map(str::to_string),
            value,
            created: entry.created(),
            last_accessed: entry.last_accessed(),
            absolute_expiration,
            sliding_expiration_ms,
            dependencies: entry.dependencies().len(),
        }
    }
}

/// Response body for DELETE /entries/:key
#[derive(Debug, Clone, Serialize)]
pub struct DeleteResponse {
    /// Success message
    pub message: String,
    /// The key that was deleted
    pub key: String,
}

impl DeleteResponse {
    /// Creates a new DeleteResponse
    pub fn new(key: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            message: format!("Key '{}' deleted successfully", key),
            key,
        }
    }
}

/// Response body for DELETE /entries
#[derive(Debug, Clone, Serialize)]
pub struct ClearResponse {
    /// Number of entries removed
    pub removed: usize,
    /// Group that was cleared; absent when the whole store was cleared
    pub group: Option<String>,
}

/// Response body for the stats endpoint (GET /stats)
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    pub hits: u64,
    pub misses: u64,
    pub expirations: u64,
    pub invalidations: u64,
    pub removals: u64,
    /// Entries in the map, including expired entries not yet swept
    pub total_entries: usize,
    /// Live entries, restricted to the requested group if any
    pub live_entries: usize,
    /// Hit rate (hits / (hits + misses))
    pub hit_rate: f64,
    pub sweeper_running: bool,
}

impl StatsResponse {
    /// Creates a new StatsResponse from cache statistics
    pub fn new(stats: &CacheStats, live_entries: usize, sweeper_running: bool) -> Self {
        Self {
            hits: stats.hits,
            misses: stats.misses,
            expirations: stats.expirations,
            invalidations: stats.invalidations,
            removals: stats.removals,
            total_entries: stats.total_entries,
            live_entries,
            hit_rate: stats.hit_rate(),
            sweeper_running,
        }
    }
}

/// Response body for the health endpoint (GET /health)
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Health status (e.g., "healthy")
    pub status: String,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    /// Creates a new HealthResponse with current timestamp
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

/// Error response body for all error conditions
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    /// Error message describing what went wrong
    pub error: String,
}

impl ErrorResponse {
    /// Creates a new ErrorResponse
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}
