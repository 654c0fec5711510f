//! Storage backends for pdict
//!
//! This crate implements the `Backend` capability defined in `pdict-core`:
//! - FileBackend: append-only single file, CRC-checked records, advisory
//!   file locks, incremental index refresh, in-place compaction
//! - MemoryBackend: process-local map, clones share one store
//! - format: header and record encoding for the backing file
//! - index: key → latest record offset and stamp

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod file;
pub mod format;
pub mod index;
pub mod memory;

pub use file::{CompactionStats, FileBackend};
pub use index::{IndexEntry, KeyIndex};
pub use memory::MemoryBackend;
