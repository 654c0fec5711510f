//! In-memory backend
//!
//! `MemoryBackend` keeps the whole store in a `BTreeMap` behind a
//! `parking_lot::RwLock`. Cloning a `MemoryBackend` yields another reference
//! to the same store, the in-process analogue of opening the same file twice;
//! `MemoryBackend::new()` always creates an independent store.
//!
//! Useful for tests and for ephemeral dictionaries. Nothing is persisted.

use parking_lot::RwLock;
use pdict_core::{Backend, BackendError, BackendResult, KeyBytes, RawEntry, Version};
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Default)]
struct MemoryState {
    entries: BTreeMap<KeyBytes, RawEntry>,
    /// Last stamp issued, by puts and deletes alike
    last_version: Version,
}

impl MemoryState {
    fn next_version(&mut self) -> BackendResult<Version> {
        self.last_version = self
            .last_version
            .next()
            .ok_or(BackendError::VersionsExhausted(self.last_version))?;
        Ok(self.last_version)
    }
}

/// Process-local backend; clones share one store
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    inner: Arc<RwLock<MemoryState>>,
}

impl MemoryBackend {
    /// Create a new empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if two backends reference the same store
    pub fn same_store(&self, other: &MemoryBackend) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Backend for MemoryBackend {
    fn get_raw(&self, key: &[u8]) -> BackendResult<Option<RawEntry>> {
        Ok(self.inner.read().entries.get(key).cloned())
    }

    fn get_version(&self, key: &[u8]) -> BackendResult<Option<Version>> {
        Ok(self.inner.read().entries.get(key).map(|entry| entry.version))
    }

    fn put_raw(&self, key: &[u8], bytes: &[u8]) -> BackendResult<Version> {
        let mut state = self.inner.write();
        let version = state.next_version()?;
        state
            .entries
            .insert(key.to_vec(), RawEntry::new(bytes.to_vec(), version));
        Ok(version)
    }

    fn delete(&self, key: &[u8]) -> BackendResult<Option<Version>> {
        let mut state = self.inner.write();
        let Some(previous) = state.entries.get(key).map(|entry| entry.version) else {
            return Ok(None);
        };
        state.next_version()?;
        state.entries.remove(key);
        Ok(Some(previous))
    }

    fn len(&self) -> BackendResult<usize> {
        Ok(self.inner.read().entries.len())
    }

    fn keys(&self) -> BackendResult<Vec<KeyBytes>> {
        Ok(self.inner.read().entries.keys().cloned().collect())
    }
}
