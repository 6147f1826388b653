//! Notification Hub Module
//!
//! Global lifecycle hooks and per-key watch callbacks.
//!
//! Every operation records the transitions it caused as a batch of
//! [`Notification`]s while it holds the cache guard. The batch is dispatched
//! only after the guard is released, so callbacks may call back into the cache.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

// == Operation ==
/// Kind of transition reported to watch callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Operation {
    Insert,
    Update,
    Delete,
    Evict,
    Expire,
}

/// Hook receiving `(key, value)`.
pub type EntryHook<K, V> = Arc<dyn Fn(&K, &V) + Send + Sync>;

/// Hook receiving `(key, old_value, new_value)`.
pub type UpdateHook<K, V> = Arc<dyn Fn(&K, &V, &V) + Send + Sync>;

/// Per-key callback receiving `(key, operation, old_value, new_value)`.
///
/// `old_value` is `None` for inserts, `new_value` is `None` for removals.
pub type WatchFn<K, V> = Arc<dyn Fn(&K, Operation, Option<&V>, Option<&V>) + Send + Sync>;

// == Hooks ==
/// Single-slot global hooks. Registering a hook replaces the previous one.
pub(crate) struct Hooks<K, V> {
    pub on_insert: Option<EntryHook<K, V>>,
    pub on_update: Option<UpdateHook<K, V>>,
    pub on_delete: Option<EntryHook<K, V>>,
    pub on_expire: Option<EntryHook<K, V>>,
    pub on_evict: Option<EntryHook<K, V>>,
}

impl<K, V> Default for Hooks<K, V> {
    fn default() -> Self {
        Self {
            on_insert: None,
            on_update: None,
            on_delete: None,
            on_expire: None,
            on_evict: None,
        }
    }
}

impl<K, V> Clone for Hooks<K, V> {
    fn clone(&self) -> Self {
        Self {
            on_insert: self.on_insert.clone(),
            on_update: self.on_update.clone(),
            on_delete: self.on_delete.clone(),
            on_expire: self.on_expire.clone(),
            on_evict: self.on_evict.clone(),
        }
    }
}

impl<K, V> fmt::Debug for Hooks<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks")
            .field("on_insert", &self.on_insert.is_some())
            .field("on_update", &self.on_update.is_some())
            .field("on_delete", &self.on_delete.is_some())
            .field("on_expire", &self.on_expire.is_some())
            .field("on_evict", &self.on_evict.is_some())
            .finish()
    }
}

impl<K, V> Hooks<K, V> {
    // == Dispatch ==
    /// Delivers a batch in the order the transitions happened.
    ///
    /// For each transition the global hook runs first, then the key's watch.
    pub fn dispatch(&self, batch: Vec<Notification<K, V>>) {
        for notification in batch {
            self.notify(&notification);
        }
    }

    fn notify(&self, n: &Notification<K, V>) {
        let hook = match n.op {
            Operation::Insert => {
                if let (Some(hook), Some(new)) = (&self.on_insert, &n.new) {
                    hook(&n.key, new);
                }
                None
            }
            Operation::Update => {
                if let (Some(hook), Some(old), Some(new)) = (&self.on_update, &n.old, &n.new) {
                    hook(&n.key, old, new);
                }
                None
            }
            Operation::Delete => self.on_delete.as_ref(),
            Operation::Evict => self.on_evict.as_ref(),
            Operation::Expire => self.on_expire.as_ref(),
        };
        if let (Some(hook), Some(old)) = (hook, &n.old) {
            hook(&n.key, old);
        }

        if let Some(watch) = &n.watch {
            watch(&n.key, n.op, n.old.as_ref(), n.new.as_ref());
        }
    }
}

// == Notification ==
/// An owned record of one transition, carried out of the critical section.
pub(crate) struct Notification<K, V> {
    pub op: Operation,
    pub key: K,
    pub old: Option<V>,
    pub new: Option<V>,
    pub watch: Option<WatchFn<K, V>>,
}

impl<K, V> Notification<K, V> {
    pub fn insert(key: K, new: V, watch: Option<WatchFn<K, V>>) -> Self {
        Self {
            op: Operation::Insert,
            key,
            old: None,
            new: Some(new),
            watch,
        }
    }

    pub fn update(key: K, old: V, new: V, watch: Option<WatchFn<K, V>>) -> Self {
        Self {
            op: Operation::Update,
            key,
            old: Some(old),
            new: Some(new),
            watch,
        }
    }

    /// Delete, evict or expire: the entry is gone and `old` is its last value.
    pub fn removal(op: Operation, key: K, old: V, watch: Option<WatchFn<K, V>>) -> Self {
        debug_assert!(matches!(
            op,
            Operation::Delete | Operation::Evict | Operation::Expire
        ));
        Self {
            op,
            key,
            old: Some(old),
            new: None,
            watch,
        }
    }
}
