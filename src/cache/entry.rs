//! Cache Entry Module
//!
//! Defines the structure for individual cache entries with TTL support.

use std::fmt;
use std::time::Duration;

use tokio::time::Instant;

use crate::cache::hooks::WatchFn;

// == Expiry ==
/// Deadline of an armed entry.
///
/// `generation` is the handle of the scheduled fire: the expiration queue only
/// acts on a deadline whose generation still matches the entry's.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Expiry {
    /// Absolute time at which the entry expires
    pub deadline: Instant,
    /// TTL the deadline was computed from
    pub ttl: Duration,
    /// Unique token of this arming
    pub generation: u64,
}

// == Cache Entry ==
/// Represents a single cache entry with value and metadata.
pub struct CacheEntry<K, V> {
    /// The key this entry is stored under
    pub key: K,
    /// The stored value
    pub value: V,
    /// Pending expiration, None = no expiration
    pub expiry: Option<Expiry>,
    /// Watch callback bound to this key
    pub watch: Option<WatchFn<K, V>>,
}

impl<K, V> CacheEntry<K, V> {
    // == Constructor ==
    /// Creates a new entry with no expiration and no watch.
    pub fn new(key: K, value: V) -> Self {
        Self {
            key,
            value,
            expiry: None,
            watch: None,
        }
    }

    // == Is Expired ==
    /// Checks if the entry has expired.
    ///
    /// An entry is expired when `now` is greater than or equal to its deadline.
    /// Entries without a TTL never expire.
    pub fn is_expired(&self, now: Instant) -> bool {
        match self.expiry {
            Some(expiry) => now >= expiry.deadline,
            None => false,
        }
    }

    // == Time To Live ==
    /// Returns remaining TTL, or None if no expiration is set.
    ///
    /// # Returns
    /// - `Some(Duration::ZERO)` if the deadline has passed
    /// - `Some(remaining)` if the entry has TTL and hasn't expired
    /// - `None` if the entry has no TTL (never expires)
    pub fn ttl_remaining(&self, now: Instant) -> Option<Duration> {
        self.expiry
            .map(|expiry| expiry.deadline.saturating_duration_since(now))
    }

    /// Whether `generation` is the live arming of this entry.
    pub fn is_armed_with(&self, generation: u64) -> bool {
        self.expiry
            .is_some_and(|expiry| expiry.generation == generation)
    }
}

impl<K: fmt::Debug, V: fmt::Debug> fmt::Debug for CacheEntry<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheEntry")
            .field("key", &self.key)
            .field("value", &self.value)
            .field("expiry", &self.expiry)
            .field("watched", &self.watch.is_some())
            .finish()
    }
}
