//! Single-file backend
//!
//! `FileBackend` stores every mutation as an appended record (see
//! [`format`](crate::format)) and keeps an in-memory [`KeyIndex`] of where
//! each live key's latest value sits.
//!
//! ## Sharing a file
//!
//! Any number of `FileBackend`s, in this process or others, may open the same
//! path. Each operation:
//! 1. takes an advisory lock on the file (shared for reads, exclusive for
//!    writes)
//! 2. brings its index up to date by scanning only the bytes appended since
//!    its previous operation, or rebuilding from scratch if the file was
//!    compacted in the meantime
//! 3. answers from the index, reading value bytes only for `get_raw`
//!
//! Writes go straight to the file descriptor, so the next operation of any
//! other backend on the same path sees them.
//!
//! ## Damaged tails
//!
//! An interrupted append leaves behind either fewer bytes than a record
//! prefix, a record whose intact prefix runs past the end of the file, or one
//! final record (possibly followed by zero fill) that fails its checksum.
//! Readers stop in front of it; the next writer truncates it. Any other
//! damage, including a length prefix that fails its checksum, is reported as
//! `BackendError::Corruption` and nothing is truncated.

use crate::format::{
    declared_len, decode_record, encode_delete, encode_put, record_body_len, DecodeError,
    StoreHeader, HEADER_SIZE,
};
use crate::index::KeyIndex;
use parking_lot::Mutex;
use pdict_core::{
    Backend, BackendError, BackendResult, DictConfig, Durability, KeyBytes, RawEntry, Version,
};
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Sleep between `try_lock` attempts when a lock timeout is configured
const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LockMode {
    Shared,
    Exclusive,
}

/// Held file lock, released on drop
struct FileLock<'a> {
    file: &'a File,
}

impl Drop for FileLock<'_> {
    fn drop(&mut self) {
        if let Err(e) = fs2::FileExt::unlock(self.file) {
            warn!(target: "pdict::storage", error = %e, "Failed to release file lock");
        }
    }
}

/// What this backend knows about the file
#[derive(Debug)]
struct ScanState {
    /// False until the first scan
    loaded: bool,
    /// Header generation the index was built against
    generation: u64,
    index: KeyIndex,
    /// End of the last valid record
    scanned_to: u64,
    /// Bytes past `scanned_to` that do not form a valid record
    torn_tail: bool,
}

impl ScanState {
    fn unloaded() -> Self {
        Self {
            loaded: false,
            generation: 0,
            index: KeyIndex::default(),
            scanned_to: 0,
            torn_tail: false,
        }
    }

    fn from_header(header: &StoreHeader) -> Self {
        Self {
            loaded: true,
            generation: header.generation,
            index: KeyIndex::new(header.base_version),
            scanned_to: HEADER_SIZE as u64,
            torn_tail: false,
        }
    }
}

/// Result of [`FileBackend::compact`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompactionStats {
    /// Records in the file before compaction
    pub records_before: u64,
    /// Records in the file after compaction (one per live key)
    pub records_after: u64,
    /// File size before compaction
    pub bytes_before: u64,
    /// File size after compaction
    pub bytes_after: u64,
}

/// Append-only single-file backend
#[derive(Debug)]
pub struct FileBackend {
    path: PathBuf,
    file: File,
    state: Mutex<ScanState>,
    durability: Durability,
    lock_timeout: Option<Duration>,
}

impl FileBackend {
    /// Open the store at `path`
    ///
    /// An empty or missing file (when `create_if_missing` is set) is
    /// initialized with a fresh header. Opening is idempotent: every backend
    /// opened on the same path shares the same durable state.
    ///
    /// # Errors
    ///
    /// - `BackendError::StoreNotFound` if the path does not exist and
    ///   `create_if_missing` is false
    /// - `BackendError::InvalidFormat` if the file is not a pdict store
    /// - `BackendError::Corruption` if a record before the tail is damaged
    /// - `BackendError::LockTimeout` / `BackendError::Io` from file access
    pub fn open<P: AsRef<Path>>(path: P, config: &DictConfig) -> BackendResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = match OpenOptions::new()
            .read(true)
            .write(true)
            .create(config.create_if_missing)
            .truncate(false)
            .open(&path)
        {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(BackendError::StoreNotFound(path));
            }
            Err(e) => return Err(e.into()),
        };

        let backend = FileBackend {
            path,
            file,
            state: Mutex::new(ScanState::unloaded()),
            durability: config.durability,
            lock_timeout: config.lock_timeout_duration(),
        };

        let (live_keys, dead_records) = backend.initialize()?;
        info!(
            target: "pdict::storage",
            path = %backend.path.display(),
            live_keys,
            dead_records,
            durability = ?backend.durability,
            "Opened store"
        );

        if config.compact_on_open && dead_records > live_keys as u64 {
            backend.compact()?;
        }

        Ok(backend)
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sync policy in effect
    pub fn durability(&self) -> Durability {
        self.durability
    }

    /// Rewrite the file keeping only each live key's latest record
    ///
    /// Stamps are preserved, so handles holding cached values stay fresh.
    /// Other backends on the same path notice the new generation on their
    /// next operation and rebuild their index.
    ///
    /// The rewrite happens in place under the exclusive lock; a crash part
    /// way through can lose data.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be locked, read or rewritten.
    pub fn compact(&self) -> BackendResult<CompactionStats> {
        let mut state = self.state.lock();
        let _lock = self.lock(LockMode::Exclusive)?;
        self.refresh(&mut state)?;

        let bytes_before = self.file.metadata()?.len();
        let records_before = state.index.record_count();
        let header = StoreHeader::with_generation(state.generation + 1, state.index.max_version());

        let mut buf = header.to_bytes().to_vec();
        for (_, entry) in state.index.entries_by_offset() {
            let record = self.read_at(entry.record_offset, entry.record_len)?;
            decode_record(&record).map_err(|e| into_corruption(entry.record_offset, e))?;
            buf.extend_from_slice(&record);
        }

        self.write_at(0, &buf)?;
        self.file.set_len(buf.len() as u64)?;
        self.file.sync_all()?;

        *state = ScanState::unloaded();
        self.refresh(&mut state)?;

        let stats = CompactionStats {
            records_before,
            records_after: state.index.record_count(),
            bytes_before,
            bytes_after: buf.len() as u64,
        };
        info!(
            target: "pdict::storage",
            path = %self.path.display(),
            generation = state.generation,
            records_before = stats.records_before,
            records_after = stats.records_after,
            bytes_before = stats.bytes_before,
            bytes_after = stats.bytes_after,
            "Compacted store"
        );
        Ok(stats)
    }

    /// Write the header into an empty file and build the initial index
    ///
    /// Returns (live keys, dead records).
    fn initialize(&self) -> BackendResult<(usize, u64)> {
        let mut state = self.state.lock();
        let _lock = self.lock(LockMode::Exclusive)?;

        if self.file.metadata()?.len() == 0 {
            self.write_at(0, &StoreHeader::new().to_bytes())?;
            self.file.sync_all()?;
            debug!(target: "pdict::storage", path = %self.path.display(), "Initialized empty store");
        }

        self.refresh(&mut state)?;
        Ok((state.index.len(), state.index.dead_records()))
    }

    fn lock(&self, mode: LockMode) -> BackendResult<FileLock<'_>> {
        let Some(timeout) = self.lock_timeout else {
            match mode {
                LockMode::Shared => fs2::FileExt::lock_shared(&self.file)?,
                LockMode::Exclusive => fs2::FileExt::lock_exclusive(&self.file)?,
            }
            return Ok(FileLock { file: &self.file });
        };

        let started = Instant::now();
        loop {
            let attempt = match mode {
                LockMode::Shared => fs2::FileExt::try_lock_shared(&self.file),
                LockMode::Exclusive => fs2::FileExt::try_lock_exclusive(&self.file),
            };
            match attempt {
                Ok(()) => return Ok(FileLock { file: &self.file }),
                Err(e) if e.kind() == fs2::lock_contended_error().kind() => {
                    let waited = started.elapsed();
                    if waited >= timeout {
                        return Err(BackendError::LockTimeout {
                            path: self.path.clone(),
                            waited,
                        });
                    }
                    std::thread::sleep(LOCK_POLL_INTERVAL.min(timeout - waited));
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Bring `state` up to date with the file. Caller holds a file lock.
    fn refresh(&self, state: &mut ScanState) -> BackendResult<()> {
        let file_len = self.file.metadata()?.len();
        let header = self.read_header(file_len)?;

        if !state.loaded || header.generation != state.generation || file_len < state.scanned_to {
            if state.loaded {
                debug!(
                    target: "pdict::storage",
                    path = %self.path.display(),
                    old_generation = state.generation,
                    new_generation = header.generation,
                    "Store was rewritten, rebuilding index"
                );
            }
            *state = ScanState::from_header(&header);
        }

        if file_len > state.scanned_to {
            self.scan_tail(state, file_len)?;
        } else {
            state.torn_tail = false;
        }
        Ok(())
    }

    fn read_header(&self, file_len: u64) -> BackendResult<StoreHeader> {
        if file_len < HEADER_SIZE as u64 {
            return Err(BackendError::invalid_format(
                &self.path,
                format!(
                    "file is {} bytes, shorter than the {}-byte header",
                    file_len, HEADER_SIZE
                ),
            ));
        }
        let bytes = self.read_at(0, HEADER_SIZE)?;
        let mut raw = [0u8; HEADER_SIZE];
        raw.copy_from_slice(&bytes);
        let header = StoreHeader::from_bytes(&raw);
        header
            .validate()
            .map_err(|reason| BackendError::invalid_format(&self.path, reason))?;
        Ok(header)
    }

    /// Replay records between `state.scanned_to` and `file_len`
    fn scan_tail(&self, state: &mut ScanState, file_len: u64) -> BackendResult<()> {
        let start = state.scanned_to;
        let buf = self.read_at(start, (file_len - start) as usize)?;

        let mut pos = 0usize;
        let mut damaged_tail = None;
        while pos < buf.len() {
            let offset = start + pos as u64;
            match decode_record(&buf[pos..]) {
                Ok(record) => {
                    state.index.apply(&record, offset);
                    pos += record.encoded_len;
                }
                Err(DecodeError::Incomplete { have, needed }) => {
                    damaged_tail = Some(format!("incomplete record ({} of {} bytes)", have, needed));
                    break;
                }
                Err(DecodeError::Corrupt(reason)) if is_torn_tail(&buf[pos..]) => {
                    damaged_tail = Some(reason);
                    break;
                }
                Err(DecodeError::Corrupt(reason)) => {
                    return Err(BackendError::corruption(offset, reason));
                }
            }
        }

        state.scanned_to = start + pos as u64;
        match damaged_tail {
            Some(reason) => {
                if !state.torn_tail {
                    warn!(
                        target: "pdict::storage",
                        path = %self.path.display(),
                        offset = state.scanned_to,
                        bytes = file_len - state.scanned_to,
                        reason = %reason,
                        "Ignoring damaged tail of store"
                    );
                }
                state.torn_tail = true;
            }
            None => state.torn_tail = false,
        }
        Ok(())
    }

    /// Append an encoded record and apply it to the index. Caller holds the
    /// exclusive lock and has refreshed `state`.
    fn append(&self, state: &mut ScanState, record: &[u8]) -> BackendResult<()> {
        if state.torn_tail {
            warn!(
                target: "pdict::storage",
                path = %self.path.display(),
                offset = state.scanned_to,
                "Truncating damaged tail before append"
            );
            self.file.set_len(state.scanned_to)?;
            state.torn_tail = false;
        }

        let offset = state.scanned_to;
        self.write_at(offset, record)?;
        if self.durability.requires_sync() {
            self.file.sync_data()?;
        }

        let view = decode_record(record).map_err(|e| into_corruption(offset, e))?;
        state.index.apply(&view, offset);
        state.scanned_to = offset + record.len() as u64;
        Ok(())
    }

    fn read_at(&self, offset: u64, len: usize) -> io::Result<Vec<u8>> {
        let mut file = &self.file;
        file.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; len];
        file.read_exact(&mut buf)?;
        Ok(buf)
    }

    fn write_at(&self, offset: u64, data: &[u8]) -> io::Result<()> {
        let mut file = &self.file;
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(data)
    }
}

impl Backend for FileBackend {
    fn get_raw(&self, key: &[u8]) -> BackendResult<Option<RawEntry>> {
        let mut state = self.state.lock();
        let _lock = self.lock(LockMode::Shared)?;
        self.refresh(&mut state)?;

        let Some(entry) = state.index.get(key).copied() else {
            return Ok(None);
        };
        let buf = self.read_at(entry.record_offset, entry.record_len)?;
        let record = decode_record(&buf).map_err(|e| into_corruption(entry.record_offset, e))?;
        if record.key != key || record.version != entry.version {
            return Err(BackendError::corruption(
                entry.record_offset,
                "record does not match index entry",
            ));
        }
        Ok(Some(RawEntry::new(record.value.to_vec(), record.version)))
    }

    fn get_version(&self, key: &[u8]) -> BackendResult<Option<Version>> {
        let mut state = self.state.lock();
        let _lock = self.lock(LockMode::Shared)?;
        self.refresh(&mut state)?;
        Ok(state.index.get(key).map(|entry| entry.version))
    }

    fn put_raw(&self, key: &[u8], bytes: &[u8]) -> BackendResult<Version> {
        record_body_len(key.len(), bytes.len())?;

        let mut state = self.state.lock();
        let _lock = self.lock(LockMode::Exclusive)?;
        self.refresh(&mut state)?;

        let version = next_version(&state.index)?;
        let record = encode_put(version, key, bytes)?;
        self.append(&mut state, &record)?;
        Ok(version)
    }

    fn delete(&self, key: &[u8]) -> BackendResult<Option<Version>> {
        let mut state = self.state.lock();
        let _lock = self.lock(LockMode::Exclusive)?;
        self.refresh(&mut state)?;

        let Some(previous) = state.index.get(key).map(|entry| entry.version) else {
            return Ok(None);
        };
        let version = next_version(&state.index)?;
        let record = encode_delete(version, key)?;
        self.append(&mut state, &record)?;
        Ok(Some(previous))
    }

    fn len(&self) -> BackendResult<usize> {
        let mut state = self.state.lock();
        let _lock = self.lock(LockMode::Shared)?;
        self.refresh(&mut state)?;
        Ok(state.index.len())
    }

    fn keys(&self) -> BackendResult<Vec<KeyBytes>> {
        let mut state = self.state.lock();
        let _lock = self.lock(LockMode::Shared)?;
        self.refresh(&mut state)?;
        Ok(state.index.keys_sorted())
    }
}

/// Stamp for the next mutation
fn next_version(index: &KeyIndex) -> BackendResult<Version> {
    let last = index.max_version();
    last.next().ok_or(BackendError::VersionsExhausted(last))
}

/// Trailing zero fill, or a single damaged record with an intact length
/// prefix and nothing but zero fill after it
fn is_torn_tail(remaining: &[u8]) -> bool {
    if remaining.iter().all(|b| *b == 0) {
        return true;
    }
    match declared_len(remaining) {
        Some(len) if len <= remaining.len() => remaining[len..].iter().all(|b| *b == 0),
        _ => false,
    }
}

fn into_corruption(offset: u64, err: DecodeError) -> BackendError {
    match err {
        DecodeError::Incomplete { have, needed } => BackendError::corruption(
            offset,
            format!("record truncated ({} of {} bytes)", have, needed),
        ),
        DecodeError::Corrupt(reason) => BackendError::corruption(offset, reason),
    }
}
