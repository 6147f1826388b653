//! Cache Module
//!
//! Provides a generic in-memory cache with LRU eviction, TTL expiration and
//! change notifications.

mod engine;
mod entry;
mod expiry;
mod hooks;
mod lru;
mod stats;
mod store;

#[cfg(test)]
mod property_tests;

// Re-export public types
pub use engine::Cache;
pub use entry::{CacheEntry, Expiry};
pub use expiry::{Deadline, ExpiryQueue};
pub use hooks::{EntryHook, Operation, UpdateHook, WatchFn};
pub use lru::RecencyIndex;
pub use stats::CacheStats;
pub use store::EntryStore;
