//! Object Cache - an in-process object cache
//!
//! Stores arbitrary values under string keys with optional groups, absolute
//! or sliding expiration, and dependency-driven invalidation. Includes an
//! atomic get-or-add for memoizing expensive computations and an optional
//! HTTP admin surface.

pub mod api;
pub mod cache;
pub mod config;
pub mod dependency;
pub mod error;
pub mod models;
mod tasks;

pub use api::{create_router, AppState};
pub use cache::{CacheKey, CacheSnapshot, CacheStats, CacheStore, EntryOptions, Expiration};
pub use config::{CacheConfig, Config};
pub use dependency::{Dependency, FileDependency, ManualDependency, PollingDependency};
pub use error::{CacheError, Result};
