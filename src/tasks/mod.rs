//! Background Tasks Module
//!
//! Tasks the cache store runs on its tokio runtime.
//!
//! # Tasks
//! - Expiration Sweeper: periodically queues expired entries for eviction,
//!   and stops itself once no entry can expire
//! - Eviction Worker: removes queued entries and releases their dependencies
//!   outside the store lock

mod sweeper;
mod worker;

pub(crate) use sweeper::{spawn_expiration_sweeper, SweepReport};
pub(crate) use worker::{spawn_eviction_worker, EvictionTask};
