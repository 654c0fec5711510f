//! Per-handle entry cache
//!
//! Maps encoded key bytes to the decoded value and the stamp it was read or
//! written at. The cache is owned by exactly one [`Dict`](crate::Dict) and has
//! no locking of its own; the handle's `&mut self` methods are the only way in.

use parking_lot::RwLock;
use pdict_core::{KeyBytes, Version};
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// Decoded value shared between the cache and the caller
///
/// `Dict::get` hands out clones of this `Arc`, so in-place mutation through
/// the lock is visible to later `get`s on the same handle while the entry
/// stays fresh. It is never written back on its own.
pub type SharedValue<V> = Arc<RwLock<V>>;

/// Cached value plus the stamp it corresponds to
#[derive(Debug)]
pub struct CachedEntry<V> {
    value: SharedValue<V>,
    version: Version,
}

impl<V> CachedEntry<V> {
    /// Shared value cell
    pub fn value(&self) -> &SharedValue<V> {
        &self.value
    }

    /// Stamp the value was read or written at
    pub fn version(&self) -> Version {
        self.version
    }
}

/// Map from key bytes to cached entries
#[derive(Debug)]
pub struct EntryCache<V> {
    entries: FxHashMap<KeyBytes, CachedEntry<V>>,
}

impl<V> Default for EntryCache<V> {
    fn default() -> Self {
        Self {
            entries: FxHashMap::default(),
        }
    }
}

impl<V> EntryCache<V> {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up the entry for `key`
    pub fn lookup(&self, key: &[u8]) -> Option<&CachedEntry<V>> {
        self.entries.get(key)
    }

    /// Cache `value` at `version`, replacing any previous entry
    ///
    /// Returns the new shared cell.
    pub fn store(&mut self, key: KeyBytes, value: V, version: Version) -> SharedValue<V> {
        let value = Arc::new(RwLock::new(value));
        self.store_shared(key, Arc::clone(&value), version);
        value
    }

    /// Cache an existing shared cell at `version`
    pub fn store_shared(&mut self, key: KeyBytes, value: SharedValue<V>, version: Version) {
        self.entries.insert(key, CachedEntry { value, version });
    }

    /// Drop the entry for `key`
    pub fn evict(&mut self, key: &[u8]) -> Option<CachedEntry<V>> {
        self.entries.remove(key)
    }

    /// Drop every entry
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of cached entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if nothing is cached
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
