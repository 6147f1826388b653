//! Size Estimation
//!
//! Approximate memory taken by the values of a cache, measured over a
//! snapshot so the cache guard is not held while measuring.

use std::hash::Hash;
use std::mem;

use crate::cache::Cache;

/// Inline size of every stored value: `len × size_of::<V>()`.
///
/// Heap data owned by the values (string bytes, vector buffers) is not counted.
pub fn shallow_size_in_bytes<K, V>(cache: &Cache<K, V>) -> u64
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    (cache.len() as u64).saturating_mul(mem::size_of::<V>() as u64)
}

/// Sums `measure` over a snapshot of the stored values.
///
/// # Example
/// ```ignore
/// let bytes = estimate_size_in_bytes(&cache, |value: &String| value.len());
/// ```
pub fn estimate_size_in_bytes<K, V, F>(cache: &Cache<K, V>, measure: F) -> u64
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    F: Fn(&V) -> usize,
{
    cache
        .get_all_values()
        .iter()
        .map(|value| measure(value) as u64)
        .sum()
}
