//! Backing file format
//!
//! A store is one append-only file: a fixed header followed by records.
//!
//! # File Layout
//!
//! ```text
//! ┌────────────────────────────────────┐
//! │ Header (32 bytes)                  │
//! ├────────────────────────────────────┤
//! │ Record 1                           │
//! ├────────────────────────────────────┤
//! │ Record 2                           │
//! ├────────────────────────────────────┤
//! │ ...                                │
//! └────────────────────────────────────┘
//! ```
//!
//! # Header Layout
//!
//! ```text
//! ┌──────────┬──────────────┬────────────────┬───────────────────┬──────────────┐
//! │ Magic (4)│ Format Ver(4)│ Generation (8) │ Base Version (8)  │ Reserved (8) │
//! └──────────┴──────────────┴────────────────┴───────────────────┴──────────────┘
//! ```
//!
//! `generation` is bumped by every compaction so handles holding an index of
//! the old layout know to rebuild it. `base_version` is the highest stamp
//! issued before the last compaction; it keeps stamps unique after dead
//! records (and their stamps) are dropped.
//!
//! # Record Layout
//!
//! ```text
//! ┌────────────┬────────────────┬──────────┬────────────────────┬──────────┐
//! │ Length (4) │ Length CRC (4) │ Kind (1) │ Payload (variable) │ CRC32 (4)│
//! └────────────┴────────────────┴──────────┴────────────────────┴──────────┘
//!
//! Put payload:
//! ┌──────────────┬──────────────┬──────────────┬─────────────────────┐
//! │ Version (8)  │ Key Len (4)  │ Key          │ Value               │
//! └──────────────┴──────────────┴──────────────┴─────────────────────┘
//!
//! Delete payload:
//! ┌──────────────┬──────────────┬──────────────┐
//! │ Version (8)  │ Key Len (4)  │ Key          │
//! └──────────────┴──────────────┴──────────────┘
//! ```
//!
//! - **length**: size of kind + payload + crc (not including the prefix)
//! - **length crc**: crc32 over the 4 length bytes, so a damaged length is
//!   detected before it is used to find the next record
//! - **crc32**: over \[kind\]\[payload\]
//! - a whole record, prefix included, is at most [`MAX_RECORD_LEN`] bytes
//! - all integers little-endian

use byteorder::{ByteOrder, LittleEndian};
use crc32fast::Hasher;
use pdict_core::{BackendError, BackendResult, Version};

/// Magic bytes identifying a pdict store: "PDCT"
pub const STORE_MAGIC: [u8; 4] = *b"PDCT";

/// Current file format version
pub const FORMAT_VERSION: u32 = 1;

/// Size of the file header in bytes
pub const HEADER_SIZE: usize = 32;

/// Size of the length field
const LENGTH_SIZE: usize = 4;

/// Size of the record prefix: length(4) + length crc(4)
pub const PREFIX_SIZE: usize = LENGTH_SIZE + 4;

/// Largest encoded record, prefix included
pub const MAX_RECORD_LEN: usize = u32::MAX as usize;

/// Fixed payload prefix: version(8) + key_len(4)
const PAYLOAD_PREFIX_SIZE: usize = 12;

/// Smallest valid value of the length field: kind(1) + prefix + crc(4)
pub const MIN_RECORD_LEN: usize = 1 + PAYLOAD_PREFIX_SIZE + 4;

/// Record kind tags
const KIND_PUT: u8 = 1;
const KIND_DELETE: u8 = 2;

/// Store header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreHeader {
    /// Magic bytes: "PDCT"
    pub magic: [u8; 4],
    /// Format version for forward compatibility
    pub format_version: u32,
    /// Compaction generation
    pub generation: u64,
    /// Highest stamp issued before the last compaction
    pub base_version: Version,
}

impl StoreHeader {
    /// Header of a freshly created store
    pub fn new() -> Self {
        Self::with_generation(0, Version::ZERO)
    }

    /// Header for a given generation and base version
    pub fn with_generation(generation: u64, base_version: Version) -> Self {
        StoreHeader {
            magic: STORE_MAGIC,
            format_version: FORMAT_VERSION,
            generation,
            base_version,
        }
    }

    /// Serialize header to bytes
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut bytes = [0u8; HEADER_SIZE];
        bytes[0..4].copy_from_slice(&self.magic);
        LittleEndian::write_u32(&mut bytes[4..8], self.format_version);
        LittleEndian::write_u64(&mut bytes[8..16], self.generation);
        LittleEndian::write_u64(&mut bytes[16..24], self.base_version.as_u64());
        bytes
    }

    /// Deserialize header from bytes
    ///
    /// Does not validate; see [`StoreHeader::validate`].
    pub fn from_bytes(bytes: &[u8; HEADER_SIZE]) -> Self {
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&bytes[0..4]);
        StoreHeader {
            magic,
            format_version: LittleEndian::read_u32(&bytes[4..8]),
            generation: LittleEndian::read_u64(&bytes[8..16]),
            base_version: Version::new(LittleEndian::read_u64(&bytes[16..24])),
        }
    }

    /// Check magic and format version, describing the first problem found
    pub fn validate(&self) -> Result<(), String> {
        if self.magic != STORE_MAGIC {
            return Err(format!("bad magic {:?}", self.magic));
        }
        if self.format_version != FORMAT_VERSION {
            return Err(format!(
                "unsupported format version {} (expected {})",
                self.format_version, FORMAT_VERSION
            ));
        }
        Ok(())
    }
}

impl Default for StoreHeader {
    fn default() -> Self {
        Self::new()
    }
}

/// Kind of a record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    /// Key written with a value
    Put,
    /// Key removed
    Delete,
}

impl RecordKind {
    fn tag(self) -> u8 {
        match self {
            RecordKind::Put => KIND_PUT,
            RecordKind::Delete => KIND_DELETE,
        }
    }

    fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            KIND_PUT => Some(RecordKind::Put),
            KIND_DELETE => Some(RecordKind::Delete),
            _ => None,
        }
    }
}

/// A decoded record borrowing from the scan buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordView<'a> {
    /// Put or delete
    pub kind: RecordKind,
    /// Stamp assigned to this mutation
    pub version: Version,
    /// Key bytes
    pub key: &'a [u8],
    /// Value bytes (empty for deletes)
    pub value: &'a [u8],
    /// Total encoded size, length prefix included
    pub encoded_len: usize,
}

/// Why a record could not be decoded
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Buffer ends before the record does
    Incomplete {
        /// Bytes available
        have: usize,
        /// Bytes the record needs
        needed: usize,
    },
    /// Record is complete but invalid
    Corrupt(String),
}

/// Encode a put record
///
/// # Errors
///
/// `BackendError::RecordTooLarge` if the record would exceed [`MAX_RECORD_LEN`].
pub fn encode_put(version: Version, key: &[u8], value: &[u8]) -> BackendResult<Vec<u8>> {
    encode_record(RecordKind::Put, version, key, value)
}

/// Encode a delete record
///
/// # Errors
///
/// `BackendError::RecordTooLarge` if the key alone exceeds the record limit.
pub fn encode_delete(version: Version, key: &[u8]) -> BackendResult<Vec<u8>> {
    encode_record(RecordKind::Delete, version, key, &[])
}

/// Value of the length field for a record holding `key_len` and `value_len`
/// bytes, checked against [`MAX_RECORD_LEN`]
///
/// # Errors
///
/// `BackendError::RecordTooLarge` when the sizes do not fit.
pub fn record_body_len(key_len: usize, value_len: usize) -> BackendResult<u32> {
    let too_large = || BackendError::RecordTooLarge { key_len, value_len };
    let total_len = key_len
        .checked_add(value_len)
        .and_then(|n| n.checked_add(MIN_RECORD_LEN))
        .filter(|&n| n <= MAX_RECORD_LEN - PREFIX_SIZE)
        .ok_or_else(too_large)?;
    u32::try_from(total_len).map_err(|_| too_large())
}

fn encode_record(
    kind: RecordKind,
    version: Version,
    key: &[u8],
    value: &[u8],
) -> BackendResult<Vec<u8>> {
    let total_len = record_body_len(key.len(), value.len())?;
    // Bounded by total_len
    let key_len = u32::try_from(key.len()).map_err(|_| BackendError::RecordTooLarge {
        key_len: key.len(),
        value_len: value.len(),
    })?;
    let length = total_len.to_le_bytes();

    let mut buf = Vec::with_capacity(PREFIX_SIZE + total_len as usize);
    buf.extend_from_slice(&length);
    buf.extend_from_slice(&crc32fast::hash(&length).to_le_bytes());
    buf.push(kind.tag());
    buf.extend_from_slice(&version.as_u64().to_le_bytes());
    buf.extend_from_slice(&key_len.to_le_bytes());
    buf.extend_from_slice(key);
    buf.extend_from_slice(value);

    let mut hasher = Hasher::new();
    hasher.update(&buf[PREFIX_SIZE..]);
    let crc = hasher.finalize();
    buf.extend_from_slice(&crc.to_le_bytes());

    Ok(buf)
}

/// Full encoded size of the record starting at `buf`, if its prefix is
/// present and its length checksum matches
pub fn declared_len(buf: &[u8]) -> Option<usize> {
    if buf.len() < PREFIX_SIZE {
        return None;
    }
    let length = &buf[0..LENGTH_SIZE];
    let stored_crc = LittleEndian::read_u32(&buf[LENGTH_SIZE..PREFIX_SIZE]);
    if crc32fast::hash(length) != stored_crc {
        return None;
    }
    PREFIX_SIZE.checked_add(LittleEndian::read_u32(length) as usize)
}

/// Decode one record from the start of `buf` with CRC validation
///
/// # Errors
///
/// - `DecodeError::Incomplete` if `buf` is shorter than the prefix, or than
///   the record an intact prefix declares
/// - `DecodeError::Corrupt` on a length checksum mismatch, an out of range
///   length, CRC mismatch, unknown kind or a key length that overruns the
///   payload
pub fn decode_record(buf: &[u8]) -> Result<RecordView<'_>, DecodeError> {
    if buf.len() < PREFIX_SIZE {
        return Err(DecodeError::Incomplete {
            have: buf.len(),
            needed: PREFIX_SIZE,
        });
    }
    let encoded_len = declared_len(buf)
        .ok_or_else(|| DecodeError::Corrupt("length prefix checksum mismatch".to_string()))?;
    let total_len = encoded_len - PREFIX_SIZE;

    if total_len < MIN_RECORD_LEN {
        return Err(DecodeError::Corrupt(format!(
            "record length {} below minimum {}",
            total_len, MIN_RECORD_LEN
        )));
    }

    if encoded_len > MAX_RECORD_LEN {
        return Err(DecodeError::Corrupt(format!(
            "record length {} above maximum {}",
            encoded_len, MAX_RECORD_LEN
        )));
    }
    if buf.len() < encoded_len {
        return Err(DecodeError::Incomplete {
            have: buf.len(),
            needed: encoded_len,
        });
    }

    let body = &buf[PREFIX_SIZE..encoded_len - 4];
    let stored_crc = LittleEndian::read_u32(&buf[encoded_len - 4..encoded_len]);
    let mut hasher = Hasher::new();
    hasher.update(body);
    let computed_crc = hasher.finalize();
    if stored_crc != computed_crc {
        return Err(DecodeError::Corrupt(format!(
            "CRC mismatch: stored {:#010x}, computed {:#010x}",
            stored_crc, computed_crc
        )));
    }

    let kind = RecordKind::from_tag(body[0])
        .ok_or_else(|| DecodeError::Corrupt(format!("unknown record kind {}", body[0])))?;
    let payload = &body[1..];
    let version = Version::new(LittleEndian::read_u64(&payload[0..8]));
    let key_len = LittleEndian::read_u32(&payload[8..12]) as usize;
    let rest = &payload[PAYLOAD_PREFIX_SIZE..];
    if key_len > rest.len() {
        return Err(DecodeError::Corrupt(format!(
            "key length {} exceeds payload of {} bytes",
            key_len,
            rest.len()
        )));
    }
    let (key, value) = rest.split_at(key_len);

    if kind == RecordKind::Delete && !value.is_empty() {
        return Err(DecodeError::Corrupt(
            "delete record carries value bytes".to_string(),
        ));
    }

    Ok(RecordView {
        kind,
        version,
        key,
        value,
        encoded_len,
    })
}
