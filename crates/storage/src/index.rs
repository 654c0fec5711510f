//! In-memory offset index over a backing file
//!
//! The index maps each live key to the location of its latest put record and
//! the stamp of that put. It is what makes `get_version` cheap: answering it
//! never touches value bytes.
//!
//! The index is rebuilt by replaying records in file order; a later record for
//! a key always supersedes an earlier one.

use crate::format::{RecordKind, RecordView};
use pdict_core::{KeyBytes, Version};
use rustc_hash::FxHashMap;

/// Location and stamp of a key's latest put record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    /// File offset of the record's length prefix
    pub record_offset: u64,
    /// Encoded record size, length prefix included
    pub record_len: usize,
    /// Stamp of the put
    pub version: Version,
}

/// Key → latest put record
#[derive(Debug, Default)]
pub struct KeyIndex {
    entries: FxHashMap<KeyBytes, IndexEntry>,
    /// Highest stamp seen in the header or any record
    max_version: Version,
    /// Records replayed, live or dead
    record_count: u64,
}

impl KeyIndex {
    /// Create an empty index whose stamps continue after `base_version`
    pub fn new(base_version: Version) -> Self {
        Self {
            entries: FxHashMap::default(),
            max_version: base_version,
            record_count: 0,
        }
    }

    /// Replay one record found at `record_offset`
    pub fn apply(&mut self, record: &RecordView<'_>, record_offset: u64) {
        self.record_count += 1;
        self.max_version = self.max_version.max(record.version);
        match record.kind {
            RecordKind::Put => {
                self.entries.insert(
                    record.key.to_vec(),
                    IndexEntry {
                        record_offset,
                        record_len: record.encoded_len,
                        version: record.version,
                    },
                );
            }
            RecordKind::Delete => {
                self.entries.remove(record.key);
            }
        }
    }

    /// Look up a key
    pub fn get(&self, key: &[u8]) -> Option<&IndexEntry> {
        self.entries.get(key)
    }

    /// Number of live keys
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if no keys are live
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Live keys in ascending byte order
    pub fn keys_sorted(&self) -> Vec<KeyBytes> {
        let mut keys: Vec<KeyBytes> = self.entries.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Live entries in file order
    pub fn entries_by_offset(&self) -> Vec<(&KeyBytes, &IndexEntry)> {
        let mut entries: Vec<_> = self.entries.iter().collect();
        entries.sort_by_key(|(_, entry)| entry.record_offset);
        entries
    }

    /// Highest stamp issued so far
    pub fn max_version(&self) -> Version {
        self.max_version
    }

    /// Records replayed since the index was created
    pub fn record_count(&self) -> u64 {
        self.record_count
    }

    /// Records that no longer describe a live key
    pub fn dead_records(&self) -> u64 {
        self.record_count.saturating_sub(self.entries.len() as u64)
    }
}
