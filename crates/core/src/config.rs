//! Handle configuration
//!
//! `DictConfig` controls how a backing file is opened. It can be built in code
//! or loaded from a TOML file:
//!
//! ```toml
//! # Create the backing file when it does not exist (default: true)
//! create_if_missing = true
//!
//! # "always" = fsync after every write (default)
//! # "buffered" = leave flushing to the OS; writes are still visible to
//! #              other handles immediately
//! durability = "always"
//!
//! # Give up waiting for the file lock after this many milliseconds.
//! # Omit to block until the lock is free.
//! # lock_timeout_ms = 5000
//!
//! # Rewrite the file without dead records when it is opened (default: false)
//! compact_on_open = false
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// When appended records are forced to stable storage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Durability {
    /// `sync_data` after every put and delete
    #[default]
    Always,
    /// No explicit sync; the OS flushes on its own schedule
    Buffered,
}

impl Durability {
    /// Check if every write must be synced before returning
    pub fn requires_sync(&self) -> bool {
        matches!(self, Durability::Always)
    }
}

/// Options for opening a backing file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DictConfig {
    /// Create the store when the path does not exist
    pub create_if_missing: bool,
    /// Sync policy for writes
    pub durability: Durability,
    /// Maximum time to wait for the file lock; `None` blocks
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lock_timeout_ms: Option<u64>,
    /// Compact the file on open when most records are dead
    pub compact_on_open: bool,
}

impl Default for DictConfig {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            durability: Durability::Always,
            lock_timeout_ms: None,
            compact_on_open: false,
        }
    }
}

impl DictConfig {
    /// Set `create_if_missing`
    pub fn create_if_missing(mut self, create: bool) -> Self {
        self.create_if_missing = create;
        self
    }

    /// Set the durability mode
    pub fn durability(mut self, durability: Durability) -> Self {
        self.durability = durability;
        self
    }

    /// Set the lock timeout
    pub fn lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    /// Set `compact_on_open`
    pub fn compact_on_open(mut self, compact: bool) -> Self {
        self.compact_on_open = compact;
        self
    }

    /// Lock timeout as a `Duration`
    pub fn lock_timeout_duration(&self) -> Option<Duration> {
        self.lock_timeout_ms.map(Duration::from_millis)
    }

    /// Parse config from TOML text
    ///
    /// Missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidConfig` if the text is not valid TOML or a field
    /// has the wrong type or an unknown value.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::InvalidConfig(e.to_string()))
    }

    /// Read and parse config from a file path
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::InvalidConfig(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&content)
    }

    /// Render config as TOML
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidConfig` if serialization fails.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string(self).map_err(|e| Error::InvalidConfig(e.to_string()))
    }
}
