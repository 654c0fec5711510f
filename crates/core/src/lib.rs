//! Core types and traits for pdict
//!
//! This crate defines the foundational types used throughout the system:
//! - Version: per-key version stamp, the sole staleness signal
//! - Error: error type hierarchy (key-not-found, backend, codec)
//! - Backend: storage capability consumed by dictionary handles
//! - Codec: key/value serializer capability, with MessagePack, JSON and
//!   bincode implementations
//! - DictConfig: options for opening a backing file

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod codec;
pub mod config;
pub mod error;
pub mod traits;
pub mod version;

pub use codec::{BincodeCodec, Codec, JsonCodec, MsgpackCodec};
pub use config::{DictConfig, Durability};
pub use error::{
    BackendError, BackendResult, CodecError, CodecResult, Error, KeyBytes, Result,
};
pub use traits::{Backend, RawEntry};
pub use version::Version;
