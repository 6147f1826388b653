//! Cache Store Module
//!
//! Authoritative key → entry storage kept in lock-step with the LRU order.
//!
//! Entries live in a slot arena. The key map and the recency index both refer
//! to entries by slot index, so moving an entry in the LRU order never touches
//! the map and freed slots are recycled without reallocating.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;

use crate::cache::{CacheEntry, RecencyIndex};

// == Entry Store ==
/// Slot arena of entries plus their key index and recency order.
///
/// Not synchronized; the cache façade guards it.
#[derive(Debug)]
pub struct EntryStore<K, V> {
    /// Key → slot index
    index: HashMap<K, usize>,
    /// Entry arena, `None` marks a free slot
    slots: Vec<Option<CacheEntry<K, V>>>,
    /// Free slot indices available for reuse
    free: Vec<usize>,
    /// LRU order over occupied slots
    recency: RecencyIndex,
}

impl<K, V> Default for EntryStore<K, V> {
    fn default() -> Self {
        Self {
            index: HashMap::new(),
            slots: Vec::new(),
            free: Vec::new(),
            recency: RecencyIndex::new(),
        }
    }
}

impl<K, V> EntryStore<K, V> {
    // == Length ==
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

impl<K: Eq + Hash + Clone, V> EntryStore<K, V> {
    // == Constructor ==
    /// Creates an empty store sized for `capacity` entries.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            index: HashMap::with_capacity(capacity),
            slots: Vec::with_capacity(capacity),
            ..Default::default()
        }
    }

    // == Lookup ==
    /// Returns the slot holding `key`.
    pub fn slot_of<Q>(&self, key: &Q) -> Option<usize>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.index.get(key).copied()
    }

    pub fn get(&self, slot: usize) -> Option<&CacheEntry<K, V>> {
        self.slots.get(slot).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, slot: usize) -> Option<&mut CacheEntry<K, V>> {
        self.slots.get_mut(slot).and_then(Option::as_mut)
    }

    /// Looks an entry up by key without touching the recency order.
    pub fn entry<Q>(&self, key: &Q) -> Option<&CacheEntry<K, V>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.slot_of(key).and_then(|slot| self.get(slot))
    }

    // == Insert ==
    /// Stores a new entry as most recently used and returns its slot.
    ///
    /// An entry already stored under the same key is dropped; callers update
    /// existing entries in place instead.
    pub fn insert(&mut self, entry: CacheEntry<K, V>) -> usize {
        self.remove(&entry.key);
        let key = entry.key.clone();
        let slot = match self.free.pop() {
            Some(slot) => {
                self.slots[slot] = Some(entry);
                slot
            }
            None => {
                self.slots.push(Some(entry));
                self.slots.len() - 1
            }
        };
        self.index.insert(key, slot);
        self.recency.push_front(slot);
        slot
    }

    // == Touch ==
    /// Marks a slot as most recently used.
    pub fn touch(&mut self, slot: usize) {
        self.recency.move_to_front(slot);
    }

    // == Remove ==
    /// Removes the entry at `slot` from both the map and the recency order.
    pub fn remove_slot(&mut self, slot: usize) -> Option<CacheEntry<K, V>> {
        let entry = self.slots.get_mut(slot)?.take()?;
        self.index.remove(&entry.key);
        self.recency.remove(slot);
        self.free.push(slot);
        Some(entry)
    }

    pub fn remove<Q>(&mut self, key: &Q) -> Option<CacheEntry<K, V>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let slot = self.slot_of(key)?;
        self.remove_slot(slot)
    }

    // == Evict Oldest ==
    /// Removes and returns the least recently used entry.
    pub fn pop_lru(&mut self) -> Option<CacheEntry<K, V>> {
        let slot = self.recency.pop_back()?;
        let entry = self.slots.get_mut(slot)?.take()?;
        self.index.remove(&entry.key);
        self.free.push(slot);
        Some(entry)
    }

    /// Removes every entry, least recently used first.
    pub fn drain(&mut self) -> Vec<CacheEntry<K, V>> {
        let mut drained = Vec::with_capacity(self.len());
        while let Some(entry) = self.pop_lru() {
            drained.push(entry);
        }
        self.slots.clear();
        self.free.clear();
        self.recency.clear();
        drained
    }

    // == Iteration ==
    /// Iterates entries in unspecified order.
    pub fn iter(&self) -> impl Iterator<Item = &CacheEntry<K, V>> {
        self.slots.iter().filter_map(Option::as_ref)
    }

    /// Iterates entries from most to least recently used.
    pub fn iter_recent(&self) -> impl Iterator<Item = &CacheEntry<K, V>> {
        self.recency.iter().filter_map(move |slot| self.get(slot))
    }

    // == Consistency ==
    /// Checks that the key map and the recency order cover the same entries.
    pub fn is_consistent(&self) -> bool {
        if self.index.len() != self.recency.len() {
            return false;
        }
        let linked_and_indexed = self.recency.iter().all(|slot| {
            self.get(slot)
                .is_some_and(|entry| self.index.get(&entry.key) == Some(&slot))
        });
        let occupied = self.slots.iter().filter(|slot| slot.is_some()).count();
        linked_and_indexed && occupied == self.index.len()
    }
}
