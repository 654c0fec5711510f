//! Backend abstraction
//!
//! The `Backend` trait is the only way a dictionary handle reaches durable
//! state. Handles never share anything but a backend; swapping the storage
//! engine does not touch the cache or the staleness protocol.

use crate::error::{BackendResult, KeyBytes};
use crate::version::Version;

/// Value bytes together with the stamp of the write that produced them
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEntry {
    /// Encoded value
    pub bytes: Vec<u8>,
    /// Stamp assigned when `bytes` were written
    pub version: Version,
}

impl RawEntry {
    /// Create a raw entry
    pub fn new(bytes: Vec<u8>, version: Version) -> Self {
        Self { bytes, version }
    }
}

/// Durable mapping from key bytes to (value bytes, version stamp)
///
/// Absence is reported as `None` (or `false`), never as an error; errors are
/// reserved for failures of the store itself.
///
/// # Contract
///
/// - Every method is individually atomic with respect to other handles and
///   processes using the same store
/// - `put_raw` and `delete` are write-through: once they return, any handle
///   opened on the same store observes the change
/// - `put_raw` returns a stamp the store has never issued before, for any key;
///   once the counter reaches `u64::MAX`, writes fail with
///   `BackendError::VersionsExhausted`
/// - `get_version` must not read or decode value bytes
///
/// Thread safety: implementations are `Send + Sync`; methods take `&self`.
pub trait Backend: Send + Sync {
    /// Read the value bytes and stamp for `key`
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    fn get_raw(&self, key: &[u8]) -> BackendResult<Option<RawEntry>>;

    /// Read only the current stamp for `key`
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    fn get_version(&self, key: &[u8]) -> BackendResult<Option<Version>>;

    /// Store `bytes` under `key`, returning the new stamp
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails, if the record would
    /// be too large to store, or if no unissued stamp remains.
    fn put_raw(&self, key: &[u8], bytes: &[u8]) -> BackendResult<Version>;

    /// Remove `key`, returning the stamp it had, or `None` if it was absent
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    fn delete(&self, key: &[u8]) -> BackendResult<Option<Version>>;

    /// Number of live keys
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    fn len(&self) -> BackendResult<usize>;

    /// All live keys
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    fn keys(&self) -> BackendResult<Vec<KeyBytes>>;

    /// Check if the store holds no keys
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    fn is_empty(&self) -> BackendResult<bool> {
        Ok(self.len()? == 0)
    }
}
