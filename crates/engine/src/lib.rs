//! Dictionary engine for pdict
//!
//! This crate turns a `Backend` and a `Codec` into a typed dictionary handle:
//! - Dict: per-handle staleness protocol over a shared store
//! - EntryCache: the handle's private map of decoded values and their stamps
//!
//! Handles coordinate only through the backend. Nothing here knows how or
//! where bytes are stored.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cache;
pub mod dict;

pub use cache::{CachedEntry, EntryCache, SharedValue};
pub use dict::{CacheState, Dict};
