//! Property-Based Tests for Cache Module
//!
//! Uses proptest to check the cache against a plain `VecDeque` LRU model.

use parking_lot::Mutex;
use proptest::prelude::*;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use crate::cache::{Cache, CacheEntry, EntryStore};

// == Test Configuration ==
const KEY_SPACE: u8 = 12;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

// == Strategies ==
#[derive(Debug, Clone)]
enum CacheOp {
    Set { key: u8, value: u32 },
    Get { key: u8 },
    Update { key: u8, value: u32 },
    Delete { key: u8 },
}

fn cache_op_strategy() -> impl Strategy<Value = CacheOp> {
    prop_oneof![
        3 => (0..KEY_SPACE, any::<u32>()).prop_map(|(key, value)| CacheOp::Set { key, value }),
        2 => (0..KEY_SPACE).prop_map(|key| CacheOp::Get { key }),
        1 => (0..KEY_SPACE, any::<u32>()).prop_map(|(key, value)| CacheOp::Update { key, value }),
        1 => (0..KEY_SPACE).prop_map(|key| CacheOp::Delete { key }),
    ]
}

// == Reference Model ==
/// Front = most recently used.
struct LruModel {
    order: VecDeque<(u8, u32)>,
    capacity: usize,
    evicted: Vec<(u8, u32)>,
}

impl LruModel {
    fn new(capacity: usize) -> Self {
        Self {
            order: VecDeque::new(),
            capacity,
            evicted: Vec::new(),
        }
    }

    fn position(&self, key: u8) -> Option<usize> {
        self.order.iter().position(|(k, _)| *k == key)
    }

    fn set(&mut self, key: u8, value: u32) {
        match self.position(key) {
            Some(pos) => {
                self.order.remove(pos);
            }
            None => {
                if self.order.len() >= self.capacity {
                    if let Some(lru) = self.order.pop_back() {
                        self.evicted.push(lru);
                    }
                }
            }
        }
        self.order.push_front((key, value));
    }

    fn get(&mut self, key: u8) -> Option<u32> {
        let pos = self.position(key)?;
        let item = self.order.remove(pos)?;
        self.order.push_front(item);
        Some(item.1)
    }

    fn update(&mut self, key: u8, value: u32) -> bool {
        match self.position(key) {
            Some(pos) => {
                self.order[pos].1 = value;
                true
            }
            None => false,
        }
    }

    fn delete(&mut self, key: u8) -> bool {
        match self.position(key) {
            Some(pos) => {
                self.order.remove(pos);
                true
            }
            None => false,
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    // Any sequence of set/get/update/delete behaves like the reference LRU:
    // same results, same surviving keys, same evictions in the same order.
    #[test]
    fn prop_matches_lru_model(
        capacity in 1usize..8,
        ops in prop::collection::vec(cache_op_strategy(), 1..120)
    ) {
        let rt = runtime();
        let _guard = rt.enter();
        let cache: Cache<u8, u32> = Cache::new(capacity).unwrap();
        let evicted = Arc::new(Mutex::new(Vec::new()));
        let log = evicted.clone();
        cache.on_evict(move |k, v| log.lock().push((*k, *v)));
        let mut model = LruModel::new(capacity);

        for op in ops {
            match op {
                CacheOp::Set { key, value } => {
                    cache.set(key, value);
                    model.set(key, value);
                }
                CacheOp::Get { key } => {
                    prop_assert_eq!(cache.get(&key), model.get(key), "get({}) mismatch", key);
                }
                CacheOp::Update { key, value } => {
                    prop_assert_eq!(cache.update(&key, value), model.update(key, value));
                }
                CacheOp::Delete { key } => {
                    prop_assert_eq!(cache.delete(&key), model.delete(key));
                }
            }
            prop_assert!(cache.len() <= capacity, "size {} exceeds capacity {}", cache.len(), capacity);
            prop_assert_eq!(cache.len(), model.order.len());
        }

        let keys: HashSet<u8> = cache.get_all_keys().into_iter().collect();
        let expected: HashSet<u8> = model.order.iter().map(|(k, _)| *k).collect();
        prop_assert_eq!(keys, expected);
        prop_assert_eq!(&*evicted.lock(), &model.evicted);
    }

    // Shrinking the capacity evicts exactly the least recently used surplus.
    #[test]
    fn prop_set_capacity_evicts_oldest(
        keys in prop::collection::vec(0..KEY_SPACE, 1..40),
        new_capacity in 1usize..6
    ) {
        let rt = runtime();
        let _guard = rt.enter();
        let cache: Cache<u8, u32> = Cache::new(16).unwrap();
        let mut model = LruModel::new(16);
        for key in keys {
            cache.set(key, u32::from(key));
            model.set(key, u32::from(key));
        }

        cache.set_capacity(new_capacity).unwrap();
        model.capacity = new_capacity;
        model.order.truncate(new_capacity);

        prop_assert_eq!(cache.len(), model.order.len());
        for (key, _) in &model.order {
            prop_assert!(cache.has(key), "key {} should survive the shrink", key);
        }
    }

    // The store's key map and recency order never diverge and its recency
    // order matches the model after arbitrary inserts, touches and removals.
    #[test]
    fn prop_store_stays_consistent(ops in prop::collection::vec(cache_op_strategy(), 1..150)) {
        let mut store: EntryStore<u8, u32> = EntryStore::with_capacity(KEY_SPACE as usize);
        let mut model = LruModel::new(usize::MAX);

        for op in ops {
            match op {
                CacheOp::Set { key, value } => {
                    match store.slot_of(&key) {
                        Some(slot) => {
                            store.touch(slot);
                            if let Some(entry) = store.get_mut(slot) {
                                entry.value = value;
                            }
                        }
                        None => {
                            store.insert(CacheEntry::new(key, value));
                        }
                    }
                    model.set(key, value);
                }
                CacheOp::Get { key } => {
                    if let Some(slot) = store.slot_of(&key) {
                        store.touch(slot);
                    }
                    model.get(key);
                }
                CacheOp::Update { key, .. } | CacheOp::Delete { key } => {
                    store.remove(&key);
                    model.delete(key);
                }
            }
            prop_assert!(store.is_consistent());
        }

        let order: Vec<(u8, u32)> = store.iter_recent().map(|e| (e.key, e.value)).collect();
        let expected: Vec<(u8, u32)> = model.order.iter().copied().collect();
        prop_assert_eq!(order, expected);
    }
}

// Separate proptest block with fewer cases for TTL behavior on a paused clock
proptest! {
    #![proptest_config(ProptestConfig::with_cases(20))]

    // An entry stored with a TTL is gone once the TTL has elapsed, and its
    // expiration is reported exactly once with the last stored value.
    #[test]
    fn prop_ttl_expiration_behavior(
        key in 0..KEY_SPACE,
        value in any::<u32>(),
        ttl_ms in 1u64..500
    ) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .start_paused(true)
            .build()
            .unwrap();
        let expired = Arc::new(Mutex::new(Vec::new()));

        rt.block_on(async {
            let cache: Cache<u8, u32> = Cache::new(4).unwrap();
            let log = expired.clone();
            cache.on_expire(move |k, v| log.lock().push((*k, *v)));
            let ttl = std::time::Duration::from_millis(ttl_ms);

            cache.set_with_ttl(key, value, ttl);
            assert_eq!(cache.get(&key), Some(value));

            tokio::time::sleep(ttl * 2).await;
            assert!(!cache.has(&key));
            assert_eq!(cache.get(&key), None);
        });

        prop_assert_eq!(&*expired.lock(), &vec![(key, value)]);
    }
}
