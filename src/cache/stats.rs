//! Cache Statistics Module
//!
//! Tracks cache activity: hits, misses, and the ways entries leave the store.

use serde::Serialize;

use crate::cache::EvictionReason;

// == Cache Stats ==
/// Tracks cache performance metrics.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    /// Number of successful cache retrievals
    pub hits: u64,
    /// Number of failed cache retrievals (key not found or expired)
    pub misses: u64,
    /// Number of entries evicted because their absolute or sliding expiration elapsed
    pub expirations: u64,
    /// Number of entries evicted because a dependency changed
    pub invalidations: u64,
    /// Number of entries removed explicitly via remove or clear
    pub removals: u64,
    /// Current number of entries in the store, including expired entries
    /// not yet swept
    pub total_entries: usize,
}

impl CacheStats {
    // == Constructor ==
    /// Creates a new CacheStats with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    // == Hit Rate ==
    /// Calculates the cache hit rate.
    ///
    /// Returns hits / (hits + misses), or 0.0 if no requests have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    /// Counts an entry leaving the store without an explicit remove.
    pub fn record_eviction(&mut self, reason: EvictionReason) {
        match reason {
            EvictionReason::Expired => self.expirations += 1,
            EvictionReason::DependencyChanged => self.invalidations += 1,
        }
    }

    pub fn record_removals(&mut self, count: usize) {
        self.removals += count as u64;
    }

    // == Update Entry Count ==
    /// Updates the total entries count.
    pub fn set_total_entries(&mut self, count: usize) {
        self.total_entries = count;
    }
}
