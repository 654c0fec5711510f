//! pdict - persistent dictionary backed by a single shared file
//!
//! Every [`Dict`] handle keeps a private cache of decoded values and checks
//! each cached key's version stamp against the store before returning it.
//! Several handles, in one process or many, can open the same file and each
//! sees the others' writes on its next read of the affected key.
//!
//! # Quick Start
//!
//! ```ignore
//! use pdict::Dict;
//!
//! let mut first: Dict<String, Vec<String>> = Dict::open("tasks.pdict")?;
//! let mut second: Dict<String, Vec<String>> = Dict::open("tasks.pdict")?;
//!
//! first.set("queue", vec!["Created".to_string()])?;
//! assert_eq!(second.len()?, 1);
//! assert_eq!(second.get("queue")?.read()[0], "Created");
//!
//! // In-place mutation stays local until written back
//! let queue = second.get("queue")?;
//! queue.write().push("Another".to_string());
//! second.set_shared("queue", &queue)?;
//! assert_eq!(first.get("queue")?.read().len(), 2);
//! ```
//!
//! # Architecture
//!
//! - `pdict-core`: version stamps, errors, the `Backend` and `Codec` traits,
//!   configuration
//! - `pdict-storage`: `FileBackend` (the on-disk store) and `MemoryBackend`
//! - `pdict-engine`: `Dict` and its entry cache

pub use pdict_core::{
    Backend, BackendError, BincodeCodec, Codec, CodecError, DictConfig, Durability, Error,
    JsonCodec, KeyBytes, MsgpackCodec, RawEntry, Result, Version,
};
pub use pdict_engine::{CacheState, CachedEntry, Dict, EntryCache, SharedValue};
pub use pdict_storage::{CompactionStats, FileBackend, MemoryBackend};
