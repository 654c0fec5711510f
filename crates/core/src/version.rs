//! Version stamp type
//!
//! Every successful write to a key produces a new `Version`. A handle keeps
//! the stamp it last saw next to its cached value and compares it against the
//! backend's current stamp to decide whether the cached value is still fresh.
//!
//! ## Invariants
//!
//! - Stamps are issued from a per-store monotonically increasing counter
//! - A stamp is never issued twice by the same store, for any key
//! - A store that has issued `u64::MAX` refuses further writes rather than
//!   reissue a stamp
//! - Equality is the only comparison the staleness protocol relies on;
//!   ordering exists for diagnostics and for restoring the counter on open

use serde::{Deserialize, Serialize};

/// Opaque per-key version stamp
///
/// Assigned by a [`Backend`](crate::Backend) on every `put_raw`.
/// Two stamps for the same key are equal only if no write happened between
/// the two observations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Version(u64);

impl Version {
    /// The stamp a store reports before it has issued any
    pub const ZERO: Version = Version(0);

    /// Create a version from its raw counter value
    pub const fn new(raw: u64) -> Self {
        Version(raw)
    }

    /// Get the numeric value
    #[inline]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }

    /// The next stamp after this one, or `None` once `u64::MAX` is issued
    pub const fn next(&self) -> Option<Self> {
        match self.0.checked_add(1) {
            Some(raw) => Some(Version(raw)),
            None => None,
        }
    }

    /// Check if this version is zero
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "v{}", self.0)
    }
}

impl Default for Version {
    fn default() -> Self {
        Version::ZERO
    }
}

impl From<u64> for Version {
    fn from(v: u64) -> Self {
        Version(v)
    }
}
