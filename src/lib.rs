//! TTL LRU Cache - A generic in-process cache
//!
//! Bounded LRU eviction, per-entry TTL expiration and change hooks behind a
//! single guard, safe to share across threads.

pub mod cache;
pub mod config;
pub mod error;
pub mod export;
pub mod size;
pub mod tasks;

pub use cache::{Cache, CacheStats, Operation};
pub use config::CacheConfig;
pub use error::{CacheError, Result};
