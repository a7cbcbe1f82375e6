//! Cache Module
//!
//! Provides the in-process object store with absolute/sliding expiration,
//! dependency invalidation, and get-or-add memoization.

mod entry;
mod key;
mod options;
mod stats;
mod store;


// Re-export public types
pub use entry::{CacheEntry, CacheValue, EvictionReason};
pub use key::CacheKey;
pub use options::{EntryOptions, Expiration, MAX_SLIDING_EXPIRATION};
pub use stats::CacheStats;
pub use store::{CacheSnapshot, CacheStore};

pub(crate) use store::WeakCacheStore;
