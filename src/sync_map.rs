//! Thread-safe map used to track the lifecycle of repeating timers.
//!
//! `SyncMap` is a thin wrapper around a `HashMap` guarded by a `parking_lot`
//! reader-writer lock. Lookups (`get`, `contains_key`) take the shared lock,
//! mutations take the exclusive lock, and no lock is ever held after a method
//! returns. No ordering guarantees are provided.
//!
//! # Examples
//!
//! ```
//! use prometheus_timer_pool::SyncMap;
//!
//! let map = SyncMap::new();
//! map.insert(7_u64, "running");
//! assert!(map.contains_key(&7));
//! assert_eq!(map.replace(&7, "cancelled"), Some("running"));
//! assert_eq!(map.remove(&7), Some("cancelled"));
//! assert!(map.is_empty());
//! ```

use std::collections::HashMap;
use std::hash::Hash;

use parking_lot::RwLock;

/// A concurrent key/value map with its own lock.
#[derive(Debug)]
pub struct SyncMap<K, V> {
    inner: RwLock<HashMap<K, V>>,
}

impl<K, V> Default for SyncMap<K, V> {
    fn default() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }
}

impl<K, V> SyncMap<K, V>
where
    K: Eq + Hash,
{
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or overwrites `key`, returning the previous value.
    pub fn insert(&self, key: K, value: V) -> Option<V> {
        self.inner.write().insert(key, value)
    }

    /// Overwrites the value for `key` only if the key is present.
    ///
    /// Returns the previous value, or `None` (and leaves the map untouched)
    /// when the key is absent.
    pub fn replace(&self, key: &K, value: V) -> Option<V> {
        let mut map = self.inner.write();
        map.get_mut(key).map(|slot| std::mem::replace(slot, value))
    }

    /// Removes `key`, returning its value if it was present.
    pub fn remove(&self, key: &K) -> Option<V> {
        self.inner.write().remove(key)
    }

    /// Returns true if `key` is present.
    pub fn contains_key(&self, key: &K) -> bool {
        self.inner.read().contains_key(key)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    /// Returns true if the map holds no entries.
    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

impl<K, V> SyncMap<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    /// Returns a copy of the value stored for `key`.
    pub fn get(&self, key: &K) -> Option<V> {
        self.inner.read().get(key).cloned()
    }
}
