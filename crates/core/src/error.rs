//! Error types for pdict
//!
//! Dictionary operations fail in one of three places:
//! - `Error::KeyNotFound`: the key is absent from the backend at check time
//! - `BackendError`: the storage engine failed (I/O, corruption, locking)
//! - `CodecError`: a value or key could not be encoded or decoded
//!
//! `Error::InvalidConfig` covers configuration loading, before any handle
//! exists.
//!
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.
//! Backend and codec errors are wrapped, never rewritten, so callers can match
//! on the original failure.

use crate::version::Version;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Encoded key bytes, as produced by the codec
pub type KeyBytes = Vec<u8>;

/// Result type alias for dictionary operations
pub type Result<T> = std::result::Result<T, Error>;

/// Result type alias for backend operations
pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// Result type alias for codec operations
pub type CodecResult<T> = std::result::Result<T, CodecError>;

/// Top-level error returned by dictionary handles
#[derive(Debug, Error)]
pub enum Error {
    /// Key absent from the backend
    ///
    /// Also returned when the key was cached by this handle but has since
    /// been deleted through another handle.
    #[error("Key not found: {}", BASE64.encode(.0))]
    KeyNotFound(KeyBytes),

    /// Storage engine failure, propagated unmodified
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    /// Serialization failure, propagated unmodified
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// Configuration could not be read or parsed
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Check if this is a key-not-found error
    pub fn is_key_not_found(&self) -> bool {
        matches!(self, Error::KeyNotFound(_))
    }
}

/// Errors raised by storage backends
#[derive(Debug, Error)]
pub enum BackendError {
    /// I/O error on the backing file
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The backing store does not exist and creation was not requested
    #[error("Store not found: {}", .0.display())]
    StoreNotFound(PathBuf),

    /// The backing file is not a pdict store (bad magic or unknown format version)
    #[error("Invalid store format in {}: {reason}", .path.display())]
    InvalidFormat {
        /// File that failed validation
        path: PathBuf,
        /// What was wrong with it
        reason: String,
    },

    /// A record failed validation
    #[error("Data corruption at offset {offset}: {reason}")]
    Corruption {
        /// File offset of the bad record
        offset: u64,
        /// What was wrong with it
        reason: String,
    },

    /// The file lock could not be acquired in time
    #[error("Timed out after {waited:?} waiting for lock on {}", .path.display())]
    LockTimeout {
        /// Locked file
        path: PathBuf,
        /// How long we waited
        waited: Duration,
    },

    /// A key and value too large to fit in one record
    #[error("Record too large: {key_len}-byte key and {value_len}-byte value exceed the 4 GiB record limit")]
    RecordTooLarge {
        /// Encoded key size
        key_len: usize,
        /// Encoded value size
        value_len: usize,
    },

    /// Every version stamp has been issued
    #[error("Version stamps exhausted: last issued {0}")]
    VersionsExhausted(Version),
}

impl BackendError {
    /// Create a corruption error
    pub fn corruption(offset: u64, reason: impl Into<String>) -> Self {
        BackendError::Corruption {
            offset,
            reason: reason.into(),
        }
    }

    /// Create an invalid format error
    pub fn invalid_format(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        BackendError::InvalidFormat {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Errors raised by codecs
#[derive(Debug, Error)]
pub enum CodecError {
    /// Value could not be serialized
    #[error("Encode failed: {0}")]
    Encode(String),

    /// Bytes could not be deserialized into the requested type
    #[error("Decode failed: {0}")]
    Decode(String),
}

impl From<rmp_serde::encode::Error> for CodecError {
    fn from(e: rmp_serde::encode::Error) -> Self {
        CodecError::Encode(e.to_string())
    }
}

impl From<rmp_serde::decode::Error> for CodecError {
    fn from(e: rmp_serde::decode::Error) -> Self {
        CodecError::Decode(e.to_string())
    }
}
