//! Value and key codecs
//!
//! A codec turns keys and values into bytes and back. The dictionary relies on
//! two properties only:
//! - `decode(encode(v))` reproduces `v`
//! - encoding the same key twice yields the same bytes (keys are compared by
//!   their encoding)
//!
//! Codecs do not track mutation. A value changed in place after decoding is
//! not re-encoded until the caller writes it back.

use crate::error::{CodecError, CodecResult};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Serializer capability used by dictionary handles
pub trait Codec {
    /// Encode a value to bytes
    ///
    /// # Errors
    ///
    /// Returns `CodecError::Encode` if the value cannot be represented.
    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> CodecResult<Vec<u8>>;

    /// Decode bytes into a value
    ///
    /// # Errors
    ///
    /// Returns `CodecError::Decode` if the bytes are malformed or do not
    /// describe a `T`. Never returns a partially decoded value.
    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> CodecResult<T>;
}

/// MessagePack codec (default)
///
/// Structs are encoded with field names so stored data stays readable by
/// later versions of a type that add optional fields.
#[derive(Debug, Clone, Copy, Default)]
pub struct MsgpackCodec;

impl Codec for MsgpackCodec {
    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> CodecResult<Vec<u8>> {
        Ok(rmp_serde::to_vec_named(value)?)
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> CodecResult<T> {
        Ok(rmp_serde::from_slice(bytes)?)
    }
}

/// JSON codec
///
/// Larger and slower than MessagePack, but the backing file stays
/// human-inspectable.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> CodecResult<Vec<u8>> {
        serde_json::to_vec(value).map_err(|e| CodecError::Encode(e.to_string()))
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> CodecResult<T> {
        serde_json::from_slice(bytes).map_err(|e| CodecError::Decode(e.to_string()))
    }
}

/// Bincode codec
///
/// Compact and fast, but not self-describing: the reader must use exactly the
/// type the writer used.
#[derive(Debug, Clone, Copy, Default)]
pub struct BincodeCodec;

impl Codec for BincodeCodec {
    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> CodecResult<Vec<u8>> {
        bincode::serialize(value).map_err(|e| CodecError::Encode(e.to_string()))
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> CodecResult<T> {
        bincode::deserialize(bytes).map_err(|e| CodecError::Decode(e.to_string()))
    }
}
