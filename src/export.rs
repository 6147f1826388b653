//! Snapshot Export
//!
//! Writes a point-in-time copy of a cache's items to a JSON file.
//!
//! Only keys and values are exported: TTLs and recency order are not
//! preserved. The snapshot is taken first and the file is written after the
//! cache guard has been released.

use std::collections::HashMap;
use std::fs;
use std::hash::Hash;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::cache::Cache;
use crate::error::Result;

// == Snapshot ==
/// Exported file layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(
    serialize = "K: Serialize + Eq + Hash, V: Serialize",
    deserialize = "K: Deserialize<'de> + Eq + Hash, V: Deserialize<'de>"
))]
pub struct Snapshot<K, V> {
    /// When the snapshot was taken
    pub exported_at: DateTime<Utc>,
    /// Key → value pairs present at that time
    pub items: HashMap<K, V>,
}

impl<K, V> Snapshot<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Captures the current items of `cache`.
    pub fn capture(cache: &Cache<K, V>) -> Self {
        Self {
            exported_at: Utc::now(),
            items: cache.get_all_items(),
        }
    }
}

// == Export ==
/// Exports the current items of `cache` to `path` as pretty-printed JSON.
///
/// JSON object keys must be strings, so `K` has to serialize as a string or
/// an integer.
///
/// # Returns
/// The number of exported items.
pub fn export_to_file<K, V, P>(cache: &Cache<K, V>, path: P) -> Result<usize>
where
    K: Serialize + Eq + Hash + Clone + Send + Sync + 'static,
    V: Serialize + Clone + Send + Sync + 'static,
    P: AsRef<Path>,
{
    let snapshot = Snapshot::capture(cache);
    let data = serde_json::to_vec_pretty(&snapshot)?;
    fs::write(path.as_ref(), data)?;

    info!(
        "Exported {} items to {}",
        snapshot.items.len(),
        path.as_ref().display()
    );
    Ok(snapshot.items.len())
}

/// Reads a file written by [`export_to_file`].
pub fn read_snapshot<K, V, P>(path: P) -> Result<Snapshot<K, V>>
where
    K: for<'de> Deserialize<'de> + Eq + Hash,
    V: for<'de> Deserialize<'de>,
    P: AsRef<Path>,
{
    let data = fs::read(path)?;
    Ok(serde_json::from_slice(&data)?)
}
