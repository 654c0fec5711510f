//! Dict: dictionary handle over a shared backend
//!
//! ## Design
//!
//! A `Dict` is a backend, a codec and a private [`EntryCache`]. Any number
//! of handles may share one durable store; they never talk to each other.
//! Coherence comes from version stamps alone:
//!
//! - `get` on a cached key asks the backend for the key's current stamp
//!   (no value bytes are read). Same stamp: the cached object is returned.
//!   Different stamp: the value is re-fetched and re-decoded. No stamp: the
//!   key was deleted elsewhere, so the entry is evicted and the call fails.
//! - `set` writes through and caches the new object with the stamp the
//!   backend issued for it.
//! - `len` always asks the backend.
//!
//! ## Shared values
//!
//! `get` returns a [`SharedValue`], the same `Arc` the cache holds. Mutating
//! it in place changes what this handle's later `get`s return, but nothing is
//! written until the object is passed back through [`Dict::set_shared`] (or a
//! new value through [`Dict::set`]). Other handles never see unflushed
//! mutations, and dropping a handle writes nothing.
//!
//! ## Thread Safety
//!
//! Methods that touch the cache take `&mut self`. A handle can be moved to
//! another thread; open one handle per thread to share a store.

use crate::cache::{CachedEntry, EntryCache, SharedValue};
use pdict_core::{
    Backend, Codec, DictConfig, Error, KeyBytes, MsgpackCodec, Result, Version,
};
use pdict_storage::{CompactionStats, FileBackend};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::borrow::Borrow;
use std::fmt;
use std::marker::PhantomData;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, trace};

/// Where a key stands from one handle's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheState {
    /// Not in this handle's cache
    Uncached,
    /// Cached, and the cached stamp matches the backend
    Fresh,
    /// Cached, but the backend has a newer stamp or no longer has the key
    Stale,
}

/// Persistent dictionary handle
///
/// `K` is the key type and `V` the value type; both are encoded with the
/// codec `C`. Two keys are the same key exactly when their encoded bytes are
/// equal.
///
/// # Example
///
/// ```ignore
/// let mut a: Dict<String, String> = Dict::open("store.pdict")?;
/// let mut b: Dict<String, String> = Dict::open("store.pdict")?;
///
/// a.set("state", "Created".to_string())?;
/// assert_eq!(*b.get("state")?.read(), "Created");
///
/// a.set("state", "Changed".to_string())?;
/// assert_eq!(*b.get("state")?.read(), "Changed");
/// ```
pub struct Dict<K, V, B = FileBackend, C = MsgpackCodec> {
    backend: B,
    codec: C,
    cache: EntryCache<V>,
    _key: PhantomData<fn(&K)>,
}

impl<K, V> Dict<K, V, FileBackend, MsgpackCodec> {
    /// Open (creating if needed) the store at `path` with default settings
    ///
    /// # Errors
    ///
    /// Returns `Error::Backend` if the file cannot be opened or is not a
    /// valid store.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_config(path, DictConfig::default())
    }

    /// Open the store at `path` with explicit settings
    ///
    /// # Errors
    ///
    /// Returns `Error::Backend` if the file cannot be opened, is missing and
    /// `create_if_missing` is false, or is not a valid store.
    pub fn open_with_config<P: AsRef<Path>>(path: P, config: DictConfig) -> Result<Self> {
        let backend = FileBackend::open(path, &config)?;
        Ok(Self::with_backend(backend, MsgpackCodec))
    }
}

impl<K, V, C> Dict<K, V, FileBackend, C> {
    /// Compact the backing file
    ///
    /// Cached entries stay fresh; stamps survive compaction.
    ///
    /// # Errors
    ///
    /// Returns `Error::Backend` if the file cannot be locked or rewritten.
    pub fn compact(&self) -> Result<CompactionStats> {
        Ok(self.backend.compact()?)
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        self.backend.path()
    }
}

impl<K, V, B: Backend, C: Codec> Dict<K, V, B, C> {
    /// Create a handle over any backend and codec
    pub fn with_backend(backend: B, codec: C) -> Self {
        Self {
            backend,
            codec,
            cache: EntryCache::new(),
            _key: PhantomData,
        }
    }

    /// Borrow the backend
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Borrow the codec
    pub fn codec(&self) -> &C {
        &self.codec
    }

    /// Number of live keys in the store
    ///
    /// Always answered by the backend, never by the cache.
    ///
    /// # Errors
    ///
    /// Returns `Error::Backend` if the storage operation fails.
    pub fn len(&self) -> Result<usize> {
        Ok(self.backend.len()?)
    }

    /// Check if the store has no keys
    ///
    /// # Errors
    ///
    /// Returns `Error::Backend` if the storage operation fails.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.backend.is_empty()?)
    }

    /// Drop every cached entry without touching the store
    ///
    /// Unflushed in-place mutations are discarded.
    pub fn invalidate_all(&mut self) {
        self.cache.clear();
    }

    /// Number of entries in this handle's cache
    pub fn cached_len(&self) -> usize {
        self.cache.len()
    }

    /// Fetch `key_bytes` from the backend, decode and cache it
    fn fetch(&mut self, key_bytes: KeyBytes) -> Result<SharedValue<V>>
    where
        V: DeserializeOwned,
    {
        let Some(raw) = self.backend.get_raw(&key_bytes)? else {
            self.cache.evict(&key_bytes);
            return Err(Error::KeyNotFound(key_bytes));
        };
        let value: V = self.codec.decode(&raw.bytes)?;
        Ok(self.cache.store(key_bytes, value, raw.version))
    }
}

impl<K, V, B, C> Dict<K, V, B, C>
where
    V: Serialize + DeserializeOwned,
    B: Backend,
    C: Codec,
{
    fn encode_key<Q>(&self, key: &Q) -> Result<KeyBytes>
    where
        K: Borrow<Q>,
        Q: Serialize + ?Sized,
    {
        Ok(self.codec.encode(key)?)
    }

    /// Get the current value for `key`
    ///
    /// Returns the cached object when this handle's copy is fresh, and
    /// re-fetches it when another handle has written the key since.
    ///
    /// # Errors
    ///
    /// - `Error::KeyNotFound` if the key is absent, including when it was
    ///   cached here and has since been deleted elsewhere
    /// - `Error::Backend` / `Error::Codec` from the backend or decoder
    pub fn get<Q>(&mut self, key: &Q) -> Result<SharedValue<V>>
    where
        K: Borrow<Q>,
        Q: Serialize + ?Sized,
    {
        let key_bytes = self.encode_key(key)?;
        let Some(cached) = self.cache.lookup(&key_bytes).map(CachedEntry::version) else {
            return self.fetch(key_bytes);
        };

        match self.backend.get_version(&key_bytes)? {
            None => {
                debug!(target: "pdict::dict", cached = %cached, "Key deleted elsewhere, evicting");
                self.cache.evict(&key_bytes);
                Err(Error::KeyNotFound(key_bytes))
            }
            Some(current) if current == cached => {
                trace!(target: "pdict::dict", version = %current, "Cache hit");
                match self.cache.lookup(&key_bytes) {
                    Some(entry) => Ok(Arc::clone(entry.value())),
                    None => self.fetch(key_bytes),
                }
            }
            Some(current) => {
                debug!(
                    target: "pdict::dict",
                    cached = %cached,
                    current = %current,
                    "Cached value is stale, refetching"
                );
                self.fetch(key_bytes)
            }
        }
    }

    /// Get a clone of the current value for `key`
    ///
    /// # Errors
    ///
    /// Same as [`Dict::get`].
    pub fn get_cloned<Q>(&mut self, key: &Q) -> Result<V>
    where
        K: Borrow<Q>,
        Q: Serialize + ?Sized,
        V: Clone,
    {
        let shared = self.get(key)?;
        let value = shared.read().clone();
        Ok(value)
    }

    /// Store `value` under `key`
    ///
    /// The write reaches the backend before this returns. Returns the stamp
    /// the backend issued.
    ///
    /// # Errors
    ///
    /// Returns `Error::Codec` or `Error::Backend`; the cache is left
    /// unchanged on failure.
    pub fn set<Q>(&mut self, key: &Q, value: V) -> Result<Version>
    where
        K: Borrow<Q>,
        Q: Serialize + ?Sized,
    {
        let key_bytes = self.encode_key(key)?;
        let bytes = self.codec.encode(&value)?;
        let version = self.backend.put_raw(&key_bytes, &bytes)?;
        self.cache.store(key_bytes, value, version);
        Ok(version)
    }

    /// Write back a shared value, typically one obtained from `get` and
    /// mutated in place
    ///
    /// The same `Arc` stays cached with the new stamp.
    ///
    /// # Errors
    ///
    /// Returns `Error::Codec` or `Error::Backend`.
    pub fn set_shared<Q>(&mut self, key: &Q, value: &SharedValue<V>) -> Result<Version>
    where
        K: Borrow<Q>,
        Q: Serialize + ?Sized,
    {
        let key_bytes = self.encode_key(key)?;
        let bytes = {
            let guard = value.read();
            self.codec.encode(&*guard)?
        };
        let version = self.backend.put_raw(&key_bytes, &bytes)?;
        self.cache.store_shared(key_bytes, Arc::clone(value), version);
        Ok(version)
    }

    /// Remove `key` from the store
    ///
    /// # Errors
    ///
    /// Returns `Error::KeyNotFound` if the key is absent.
    pub fn delete<Q>(&mut self, key: &Q) -> Result<()>
    where
        K: Borrow<Q>,
        Q: Serialize + ?Sized,
    {
        let key_bytes = self.encode_key(key)?;
        let removed = self.backend.delete(&key_bytes)?;
        self.cache.evict(&key_bytes);
        match removed {
            Some(_) => Ok(()),
            None => Err(Error::KeyNotFound(key_bytes)),
        }
    }

    /// Remove `key` and return its value
    ///
    /// # Errors
    ///
    /// Returns `Error::KeyNotFound` if the key is absent.
    pub fn pop<Q>(&mut self, key: &Q) -> Result<V>
    where
        K: Borrow<Q>,
        Q: Serialize + ?Sized,
        V: Clone,
    {
        let shared = self.get(key)?;
        self.delete(key)?;
        let value = match Arc::try_unwrap(shared) {
            Ok(cell) => cell.into_inner(),
            Err(shared) => shared.read().clone(),
        };
        Ok(value)
    }

    /// Check if `key` is in the store
    ///
    /// Reads only the stamp. A cached entry whose key was deleted elsewhere
    /// is evicted.
    ///
    /// # Errors
    ///
    /// Returns `Error::Backend` if the storage operation fails.
    pub fn contains<Q>(&mut self, key: &Q) -> Result<bool>
    where
        K: Borrow<Q>,
        Q: Serialize + ?Sized,
    {
        let key_bytes = self.encode_key(key)?;
        match self.backend.get_version(&key_bytes)? {
            Some(_) => Ok(true),
            None => {
                self.cache.evict(&key_bytes);
                Ok(false)
            }
        }
    }

    /// All live keys, in ascending order of their encoded bytes
    ///
    /// # Errors
    ///
    /// Returns `Error::Backend`, or `Error::Codec` if a stored key does not
    /// decode as `K`.
    pub fn keys(&self) -> Result<Vec<K>>
    where
        K: DeserializeOwned,
    {
        self.backend
            .keys()?
            .iter()
            .map(|bytes| self.codec.decode(bytes).map_err(Error::from))
            .collect()
    }

    /// Delete every key in the store and empty the cache
    ///
    /// Keys are deleted one at a time; concurrent writers may add keys while
    /// this runs. Returns the number of keys this call removed.
    ///
    /// # Errors
    ///
    /// Returns `Error::Backend` if a storage operation fails.
    pub fn clear(&mut self) -> Result<usize> {
        self.cache.clear();
        let mut removed = 0;
        for key_bytes in self.backend.keys()? {
            if self.backend.delete(&key_bytes)?.is_some() {
                removed += 1;
            }
        }
        debug!(target: "pdict::dict", removed, "Cleared store");
        Ok(removed)
    }

    /// Drop the cached entry for `key` without touching the store
    ///
    /// Returns true if an entry was cached. Unflushed in-place mutations of
    /// that entry are discarded.
    ///
    /// # Errors
    ///
    /// Returns `Error::Codec` if the key cannot be encoded.
    pub fn invalidate<Q>(&mut self, key: &Q) -> Result<bool>
    where
        K: Borrow<Q>,
        Q: Serialize + ?Sized,
    {
        let key_bytes = self.encode_key(key)?;
        Ok(self.cache.evict(&key_bytes).is_some())
    }

    /// Report whether this handle's copy of `key` is fresh
    ///
    /// Checks the stamp the same way `get` does, without decoding anything
    /// or changing the cache.
    ///
    /// # Errors
    ///
    /// Returns `Error::Backend` if the storage operation fails.
    pub fn cache_state<Q>(&self, key: &Q) -> Result<CacheState>
    where
        K: Borrow<Q>,
        Q: Serialize + ?Sized,
    {
        let key_bytes = self.encode_key(key)?;
        let Some(cached) = self.cache.lookup(&key_bytes).map(CachedEntry::version) else {
            return Ok(CacheState::Uncached);
        };
        match self.backend.get_version(&key_bytes)? {
            Some(current) if current == cached => Ok(CacheState::Fresh),
            _ => Ok(CacheState::Stale),
        }
    }
}

impl<K, V, B: fmt::Debug, C: fmt::Debug> fmt::Debug for Dict<K, V, B, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dict")
            .field("backend", &self.backend)
            .field("codec", &self.codec)
            .field("cached", &self.cache.len())
            .finish()
    }
}
