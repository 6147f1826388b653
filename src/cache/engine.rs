//! Cache Engine Module
//!
//! The synchronized public face of the cache, combining the entry store, the
//! LRU order, TTL deadlines and change notifications under one guard.
//!
//! # Concurrency
//! Every operation takes the single `parking_lot::RwLock` guarding the cache
//! state: reads that leave recency untouched (`has`, `range`, snapshots, `len`)
//! take it shared, everything else (including `get`) exclusive. The background
//! expiry task takes the same lock like any other caller.
//!
//! # Notifications
//! Transitions are recorded while the guard is held and delivered after it
//! is released, in the order they happened within the operation. Hooks and
//! watches may therefore call back into the cache. Notifications of two
//! concurrent operations may interleave. A panicking hook unwinds into the
//! caller (or is logged by the expiry task) after the guard is released, so
//! the cache stays consistent; notifications queued behind it are dropped.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::cache::hooks::{Hooks, Notification, Operation, WatchFn};
use crate::cache::{CacheEntry, CacheStats, EntryStore, ExpiryQueue};
use crate::config::{validate_capacity, CacheConfig};
use crate::error::{CacheError, Result};
use crate::tasks::{spawn_expiry_task, ExpiryDriven};

type Batch<K, V> = Vec<Notification<K, V>>;

// == Cache State ==
/// Everything the guard protects.
struct State<K, V> {
    store: EntryStore<K, V>,
    timers: ExpiryQueue,
    /// Watches registered for keys not stored yet
    pending_watches: HashMap<K, WatchFn<K, V>>,
    capacity: usize,
    stats: CacheStats,
}

impl<K: Eq + Hash + Clone, V: Clone> State<K, V> {
    fn new(capacity: usize) -> Self {
        Self {
            store: EntryStore::with_capacity(capacity.min(4096)),
            timers: ExpiryQueue::new(),
            pending_watches: HashMap::new(),
            capacity,
            stats: CacheStats::new(),
        }
    }

    // == Insert Or Overwrite ==
    /// Stores `value` under `key` as most recently used.
    ///
    /// Returns whether the expiry task must be woken.
    fn put(
        &mut self,
        key: K,
        value: V,
        ttl: Option<Duration>,
        now: Instant,
        batch: &mut Batch<K, V>,
    ) -> bool {
        // Due entries go first so they are reported as expired, not evicted
        self.reap_due(now, batch);

        if let Some(slot) = self.store.slot_of(&key) {
            self.store.touch(slot);
            let wake = self.rearm(slot, ttl, now);
            if let Some(entry) = self.store.get_mut(slot) {
                let old = std::mem::replace(&mut entry.value, value);
                batch.push(Notification::update(
                    key,
                    old,
                    entry.value.clone(),
                    entry.watch.clone(),
                ));
                self.stats.record_update();
            }
            return wake;
        }

        while self.store.len() >= self.capacity {
            if !self.evict_lru(batch) {
                break;
            }
        }

        let mut entry = CacheEntry::new(key.clone(), value.clone());
        entry.watch = self.pending_watches.remove(&key);
        let watch = entry.watch.clone();
        let slot = self.store.insert(entry);
        let wake = self.rearm(slot, ttl, now);

        batch.push(Notification::insert(key, value, watch));
        self.stats.record_insertion();
        wake
    }

    // == Lookup ==
    /// Reads and promotes an entry. Returns the value and whether to wake the
    /// expiry task (sliding expiration may move the earliest deadline).
    fn lookup<Q>(
        &mut self,
        key: &Q,
        sliding: bool,
        now: Instant,
        batch: &mut Batch<K, V>,
    ) -> (Option<V>, bool)
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let Some(slot) = self.live_slot(key, now, batch) else {
            self.stats.record_miss();
            return (None, false);
        };

        self.store.touch(slot);
        let wake = match self.store.get(slot).and_then(|entry| entry.expiry) {
            Some(expiry) if sliding => self.rearm(slot, Some(expiry.ttl), now),
            _ => false,
        };
        self.stats.record_hit();
        (self.store.get(slot).map(|entry| entry.value.clone()), wake)
    }

    // == Replace ==
    /// Replaces the value of an existing key in place, leaving recency alone.
    fn replace<Q>(
        &mut self,
        key: &Q,
        value: V,
        now: Instant,
        batch: &mut Batch<K, V>,
    ) -> Option<usize>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let slot = self.live_slot(key, now, batch)?;
        let entry = self.store.get_mut(slot)?;
        let old = std::mem::replace(&mut entry.value, value);
        batch.push(Notification::update(
            entry.key.clone(),
            old,
            entry.value.clone(),
            entry.watch.clone(),
        ));
        self.stats.record_update();
        Some(slot)
    }

    // == Remove ==
    fn remove<Q>(&mut self, key: &Q, now: Instant, batch: &mut Batch<K, V>) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.pending_watches.remove(key);
        let Some(slot) = self.live_slot(key, now, batch) else {
            return false;
        };
        let Some(entry) = self.store.remove_slot(slot) else {
            return false;
        };
        trace!("Deleted entry");
        self.stats.record_deletion();
        batch.push(Notification::removal(
            Operation::Delete,
            entry.key,
            entry.value,
            entry.watch,
        ));
        true
    }

    /// Removes every entry, reporting each as deleted. Parked watches go too.
    fn clear(&mut self, batch: &mut Batch<K, V>) -> usize {
        let drained = self.store.drain();
        self.timers.clear();
        self.pending_watches.clear();
        let count = drained.len();
        for entry in drained {
            self.stats.record_deletion();
            batch.push(Notification::removal(
                Operation::Delete,
                entry.key,
                entry.value,
                entry.watch,
            ));
        }
        count
    }

    // == Capacity ==
    fn shrink_to(&mut self, capacity: usize, batch: &mut Batch<K, V>) {
        self.capacity = capacity;
        while self.store.len() > self.capacity {
            if !self.evict_lru(batch) {
                break;
            }
        }
    }

    fn evict_lru(&mut self, batch: &mut Batch<K, V>) -> bool {
        let Some(entry) = self.store.pop_lru() else {
            return false;
        };
        debug!("Evicted least recently used entry");
        self.stats.record_eviction();
        batch.push(Notification::removal(
            Operation::Evict,
            entry.key,
            entry.value,
            entry.watch,
        ));
        true
    }

    // == Expiration ==
    /// Replaces the slot's expiry: the previous arming is dropped and a new
    /// one is armed for a non-zero `ttl`. Returns whether the new deadline is
    /// the earliest one pending.
    fn rearm(&mut self, slot: usize, ttl: Option<Duration>, now: Instant) -> bool {
        let armed = ttl
            .filter(|ttl| !ttl.is_zero())
            .map(|ttl| self.timers.arm(slot, ttl, now));
        let Some(entry) = self.store.get_mut(slot) else {
            return false;
        };
        entry.expiry = armed.map(|(expiry, _)| expiry);
        armed.is_some_and(|(_, earliest)| earliest)
    }

    /// Slot of `key` unless absent or due, in which case a due entry is expired now.
    fn live_slot<Q>(&mut self, key: &Q, now: Instant, batch: &mut Batch<K, V>) -> Option<usize>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let slot = self.store.slot_of(key)?;
        let due = self
            .store
            .get(slot)
            .is_some_and(|entry| entry.is_expired(now));
        if due {
            self.expire_slot(slot, batch);
            return None;
        }
        Some(slot)
    }

    fn expire_slot(&mut self, slot: usize, batch: &mut Batch<K, V>) {
        let Some(entry) = self.store.remove_slot(slot) else {
            return;
        };
        debug!("Expired entry");
        self.stats.record_expiration();
        batch.push(Notification::removal(
            Operation::Expire,
            entry.key,
            entry.value,
            entry.watch,
        ));
    }

    /// Expires every entry whose armed deadline is due at `now`.
    fn reap_due(&mut self, now: Instant, batch: &mut Batch<K, V>) {
        while let Some(deadline) = self.timers.pop_due(now) {
            let armed = self
                .store
                .get(deadline.slot)
                .is_some_and(|entry| entry.is_armed_with(deadline.generation));
            if armed {
                self.expire_slot(deadline.slot, batch);
            }
        }

        let store = &self.store;
        let dropped = self.timers.compact_if_needed(store.len(), |slot, generation| {
            store
                .get(slot)
                .is_some_and(|entry| entry.is_armed_with(generation))
        });
        if dropped > 0 {
            trace!("Compacted expiration queue, dropped {} stale deadlines", dropped);
        }
    }

    /// Earliest deadline still armed, discarding stale ones on the way.
    fn next_deadline(&mut self) -> Option<Instant> {
        while let Some(deadline) = self.timers.peek() {
            let armed = self
                .store
                .get(deadline.slot)
                .is_some_and(|entry| entry.is_armed_with(deadline.generation));
            if armed {
                return Some(deadline.at);
            }
            self.timers.pop();
        }
        None
    }

    // == Watch ==
    /// Binds `watch` to the live entry of `key`, or parks it until the key
    /// is inserted. A due entry is expired first and never sees the watch.
    fn attach_watch(
        &mut self,
        key: K,
        watch: WatchFn<K, V>,
        now: Instant,
        batch: &mut Batch<K, V>,
    ) {
        match self
            .live_slot(&key, now, batch)
            .and_then(|slot| self.store.get_mut(slot))
        {
            Some(entry) => entry.watch = Some(watch),
            None => {
                self.pending_watches.insert(key, watch);
            }
        }
    }

    /// Unexpired entries, in unspecified order.
    fn live_entries(&self, now: Instant) -> impl Iterator<Item = &CacheEntry<K, V>> {
        self.store.iter().filter(move |entry| !entry.is_expired(now))
    }
}

// == Shared Inner ==
struct Inner<K, V> {
    state: RwLock<State<K, V>>,
    hooks: RwLock<Hooks<K, V>>,
    wakeup: Arc<Notify>,
    sliding_expiration: bool,
}

impl<K, V> Inner<K, V> {
    /// Runs after the guard is released.
    fn finish(&self, batch: Batch<K, V>, wake: bool) {
        if wake {
            self.wakeup.notify_one();
        }
        if batch.is_empty() {
            return;
        }
        let hooks = self.hooks.read().clone();
        hooks.dispatch(batch);
    }
}

impl<K, V> Drop for Inner<K, V> {
    fn drop(&mut self) {
        // Lets the expiry task observe that the cache is gone
        self.wakeup.notify_one();
    }
}

impl<K, V> ExpiryDriven for Inner<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn expire_due(&self, now: Instant) -> Option<Instant> {
        let mut batch = Vec::new();
        let next = {
            let mut state = self.state.write();
            state.reap_due(now, &mut batch);
            state.next_deadline()
        };
        if !batch.is_empty() {
            debug!("TTL expiry: removed {} expired entries", batch.len());
        }
        self.finish(batch, false);
        next
    }
}

// == Cache ==
/// Thread-safe bounded LRU cache with per-entry TTL and change hooks.
///
/// Cloning is cheap and yields another handle to the same cache. Building a
/// cache spawns its expiry task on the current tokio runtime; the task ends
/// once every handle is dropped.
///
/// # Example
/// ```ignore
/// let cache: Cache<String, u32> = Cache::new(2)?;
/// cache.on_evict(|key, value| println!("evicted {key}={value}"));
/// cache.set("a".to_string(), 1);
/// cache.set_with_ttl("b".to_string(), 2, Duration::from_millis(50));
/// assert_eq!(cache.get("a"), Some(1));
/// ```
pub struct Cache<K, V> {
    inner: Arc<Inner<K, V>>,
}

impl<K, V> Clone for Cache<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<K, V> fmt::Debug for Cache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.read();
        f.debug_struct("Cache")
            .field("len", &state.store.len())
            .field("capacity", &state.capacity)
            .field("sliding_expiration", &self.inner.sliding_expiration)
            .finish()
    }
}

impl<K, V> Cache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    // == Constructor ==
    /// Creates a cache holding at most `capacity` entries.
    ///
    /// # Errors
    /// - `InvalidCapacity` if `capacity` is zero
    /// - `RuntimeUnavailable` if called outside a tokio runtime
    pub fn new(capacity: usize) -> Result<Self> {
        Self::from_config(&CacheConfig {
            capacity,
            ..Default::default()
        })
    }

    /// Creates a cache from configuration.
    pub fn from_config(config: &CacheConfig) -> Result<Self> {
        config.validate()?;
        Handle::try_current().map_err(|e| CacheError::RuntimeUnavailable(e.to_string()))?;

        let inner = Arc::new(Inner {
            state: RwLock::new(State::new(config.capacity)),
            hooks: RwLock::new(Hooks::default()),
            wakeup: Arc::new(Notify::new()),
            sliding_expiration: config.sliding_expiration,
        });
        spawn_expiry_task(Arc::downgrade(&inner), inner.wakeup.clone());

        debug!(
            "Cache created: capacity={}, sliding_expiration={}",
            config.capacity, config.sliding_expiration
        );
        Ok(Self { inner })
    }

    /// Runs `op` under the exclusive guard, then delivers its notifications.
    fn mutate<R>(
        &self,
        op: impl FnOnce(&mut State<K, V>, Instant, &mut Batch<K, V>) -> (R, bool),
    ) -> R {
        let now = Instant::now();
        let mut batch = Vec::new();
        let (result, wake) = {
            let mut state = self.inner.state.write();
            op(&mut state, now, &mut batch)
        };
        self.inner.finish(batch, wake);
        result
    }

    // == Set ==
    /// Stores a key-value pair with no expiration.
    ///
    /// Overwriting an existing key replaces its value, drops any pending TTL,
    /// keeps its watch and marks it most recently used. Inserting a new key
    /// into a full cache first evicts the least recently used entry.
    pub fn set(&self, key: K, value: V) {
        self.mutate(|state, now, batch| ((), state.put(key, value, None, now, batch)));
    }

    /// Same as [`Cache::set`], then expires the entry after `ttl`.
    ///
    /// A zero `ttl` means no expiration.
    pub fn set_with_ttl(&self, key: K, value: V, ttl: Duration) {
        self.mutate(|state, now, batch| ((), state.put(key, value, Some(ttl), now, batch)));
    }

    // == Get ==
    /// Returns a clone of the value and marks the entry most recently used.
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let sliding = self.inner.sliding_expiration;
        self.mutate(|state, now, batch| state.lookup(key, sliding, now, batch))
    }

    // == Has ==
    /// Checks whether a key is present, without touching recency.
    pub fn has<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let now = Instant::now();
        self.inner
            .state
            .read()
            .store
            .entry(key)
            .is_some_and(|entry| !entry.is_expired(now))
    }

    // == Update ==
    /// Replaces the value of an existing key. Absent keys are ignored.
    ///
    /// Unlike [`Cache::set`], recency and any pending TTL are left as they are.
    /// Returns whether a value was replaced.
    pub fn update<Q>(&self, key: &Q, value: V) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.mutate(|state, now, batch| (state.replace(key, value, now, batch).is_some(), false))
    }

    /// Same as [`Cache::update`], then rearms the TTL from now.
    ///
    /// A zero `ttl` clears the expiration.
    pub fn update_with_ttl<Q>(&self, key: &Q, value: V, ttl: Duration) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.mutate(|state, now, batch| match state.replace(key, value, now, batch) {
            Some(slot) => (true, state.rearm(slot, Some(ttl), now)),
            None => (false, false),
        })
    }

    // == Refresh ==
    /// Restarts the TTL of an existing key from now, keeping its value.
    ///
    /// A zero `ttl` clears the expiration. Returns whether the key was present.
    pub fn refresh<Q>(&self, key: &Q, ttl: Duration) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.mutate(|state, now, batch| match state.live_slot(key, now, batch) {
            Some(slot) => (true, state.rearm(slot, Some(ttl), now)),
            None => (false, false),
        })
    }

    // == Delete ==
    /// Removes a key. Returns false, and notifies nobody, if it was absent.
    pub fn delete<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.mutate(|state, now, batch| (state.remove(key, now, batch), false))
    }

    /// Removes every entry, reporting each one as deleted. Returns how many.
    pub fn delete_all(&self) -> usize {
        self.mutate(|state, _, batch| (state.clear(batch), false))
    }

    // == Capacity ==
    /// Changes the maximum number of entries.
    ///
    /// Shrinking below the current size evicts least recently used entries
    /// until the cache fits.
    ///
    /// # Errors
    /// `InvalidCapacity` if `capacity` is zero; the cache is left unchanged.
    pub fn set_capacity(&self, capacity: usize) -> Result<()> {
        validate_capacity(capacity)?;
        self.mutate(|state, _, batch| {
            debug!("Capacity changed from {} to {}", state.capacity, capacity);
            state.shrink_to(capacity, batch);
            ((), false)
        });
        Ok(())
    }

    pub fn capacity(&self) -> usize {
        self.inner.state.read().capacity
    }

    // == Range ==
    /// Visits entries in unspecified order until `visit` returns false.
    ///
    /// The shared guard is held during the walk: `visit` must not call back
    /// into this cache.
    pub fn range<F>(&self, mut visit: F)
    where
        F: FnMut(&K, &V) -> bool,
    {
        let now = Instant::now();
        let state = self.inner.state.read();
        for entry in state.live_entries(now) {
            if !visit(&entry.key, &entry.value) {
                break;
            }
        }
    }

    // == Snapshots ==
    /// Point-in-time list of keys.
    pub fn get_all_keys(&self) -> Vec<K> {
        let now = Instant::now();
        let state = self.inner.state.read();
        state.live_entries(now).map(|entry| entry.key.clone()).collect()
    }

    /// Point-in-time list of values.
    pub fn get_all_values(&self) -> Vec<V> {
        let now = Instant::now();
        let state = self.inner.state.read();
        state
            .live_entries(now)
            .map(|entry| entry.value.clone())
            .collect()
    }

    /// Point-in-time key → value map.
    pub fn get_all_items(&self) -> HashMap<K, V> {
        let now = Instant::now();
        let state = self.inner.state.read();
        state
            .live_entries(now)
            .map(|entry| (entry.key.clone(), entry.value.clone()))
            .collect()
    }

    // == Length ==
    /// Returns the number of stored entries.
    ///
    /// May briefly include entries whose deadline passed but which the expiry
    /// task has not removed yet.
    pub fn len(&self) -> usize {
        self.inner.state.read().store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // == Time To Live ==
    /// Remaining time before `key` expires, None if absent or never expiring.
    pub fn ttl<Q>(&self, key: &Q) -> Option<Duration>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let now = Instant::now();
        let state = self.inner.state.read();
        let entry = state.store.entry(key)?;
        if entry.is_expired(now) {
            return None;
        }
        entry.ttl_remaining(now)
    }

    // == Stats ==
    /// Returns current cache statistics.
    pub fn stats(&self) -> CacheStats {
        let state = self.inner.state.read();
        let mut stats = state.stats.clone();
        stats.set_total_entries(state.store.len());
        stats
    }

    // == Hooks ==
    /// Registers the hook called with `(key, value)` when a new key is stored.
    ///
    /// Each hook kind has a single slot: registering replaces the previous hook.
    pub fn on_insert<F>(&self, hook: F)
    where
        F: Fn(&K, &V) + Send + Sync + 'static,
    {
        self.inner.hooks.write().on_insert = Some(Arc::new(hook));
    }

    /// Registers the hook called with `(key, old, new)` when a stored value is replaced.
    pub fn on_update<F>(&self, hook: F)
    where
        F: Fn(&K, &V, &V) + Send + Sync + 'static,
    {
        self.inner.hooks.write().on_update = Some(Arc::new(hook));
    }

    /// Registers the hook called when a key is deleted explicitly.
    pub fn on_delete<F>(&self, hook: F)
    where
        F: Fn(&K, &V) + Send + Sync + 'static,
    {
        self.inner.hooks.write().on_delete = Some(Arc::new(hook));
    }

    /// Registers the hook called when a key's TTL elapses.
    ///
    /// Expirations fired by the background task run this hook on a tokio
    /// worker, so it must not block.
    pub fn on_expire<F>(&self, hook: F)
    where
        F: Fn(&K, &V) + Send + Sync + 'static,
    {
        self.inner.hooks.write().on_expire = Some(Arc::new(hook));
    }

    /// Registers the hook called when a key is evicted to respect capacity.
    pub fn on_evict<F>(&self, hook: F)
    where
        F: Fn(&K, &V) + Send + Sync + 'static,
    {
        self.inner.hooks.write().on_evict = Some(Arc::new(hook));
    }

    // == Watch ==
    /// Binds `watch` to `key`, replacing any previous watch of that key.
    ///
    /// The watch sees every transition of the key and survives updates and
    /// TTL changes; it is dropped with the entry on delete, eviction or
    /// expiration. Watching a key that is not stored yet parks the watch
    /// without taking any capacity; it attaches when the key is inserted.
    /// A parked watch is held until that insertion, or until the key is
    /// deleted or the cache is cleared, so one is kept per distinct key.
    pub fn on_watch<F>(&self, key: K, watch: F)
    where
        F: Fn(&K, Operation, Option<&V>, Option<&V>) + Send + Sync + 'static,
    {
        let watch: WatchFn<K, V> = Arc::new(watch);
        self.mutate(|state, now, batch| {
            state.attach_watch(key, watch, now, batch);
            ((), false)
        });
    }
}
