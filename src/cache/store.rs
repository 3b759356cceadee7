//! The on-disk fingerprint cache.
//!
//! # File format
//!
//! ```text
//! u8      hash size     (bit 7 reserved, must be 0)
//! u32 BE  entry count   (advisory)
//! repeated until end of file:
//!   bytes   key          (UTF-8, NUL-terminated)
//!   u32 BE  mod time     (Unix seconds, truncated to 32 bits)
//!   bytes   fingerprint  (exactly hash_size² / 8 bytes)
//! ```
//!
//! There is no magic number. A file whose hash size byte is not the one
//! the caller expects is discarded wholesale, and a damaged tail is
//! dropped record by record: everything read before the first malformed
//! record is kept.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

use super::entry::CacheEntry;
use super::key::{key_to_path, normalize_key};
use crate::config::Invalidation;
use crate::fingerprint::{Fingerprint, HashSize};
use crate::scanner::{FileSystem, MediaKind};

/// Length of the fixed header.
pub const HEADER_LEN: usize = 5;

/// Bit of the hash size byte that must be clear.
const RESERVED_BIT: u8 = 0x80;

/// Errors from loading, saving or mutating the cache.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The cache file exists but could not be read.
    #[error("Failed to read cache {}: {source}", path.display())]
    Read {
        /// Cache file path
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: io::Error,
    },

    /// The cache could not be written. Newly computed fingerprints are lost.
    #[error("Failed to write cache {}: {source}", path.display())]
    Write {
        /// Cache file path
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: io::Error,
    },

    /// A fingerprint does not match the store's hash size.
    #[error("Fingerprint for {key} is {found} bytes, expected {expected}")]
    LengthMismatch {
        /// Entry key
        key: String,
        /// Bytes required by the store's hash size
        expected: usize,
        /// Bytes supplied
        found: usize,
    },

    /// Keys are NUL-terminated on disk and cannot contain NUL.
    #[error("Invalid cache key {0:?}")]
    InvalidKey(String),

    /// The header names a hash size this build cannot use.
    #[error("Unsupported hash size {found} in cache {}", path.display())]
    UnsupportedHashSize {
        /// Cache file path
        path: PathBuf,
        /// Header value
        found: u8,
    },
}

/// Convenience alias for store results.
pub type StoreResult<T> = Result<T, StoreError>;

/// Why a cache file was thrown away on load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    /// Shorter than the 5-byte header.
    TruncatedHeader,
    /// The reserved high bit of the hash size byte is set.
    ReservedBitSet(u8),
    /// Built with a different hash size.
    HashSizeMismatch {
        /// Hash size in the file
        found: u8,
        /// Hash size currently configured
        expected: HashSize,
    },
}

impl std::fmt::Display for DiscardReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TruncatedHeader => write!(f, "header is truncated"),
            Self::ReservedBitSet(byte) => write!(f, "unrecognised header byte {byte:#04x}"),
            Self::HashSizeMismatch { found, expected } => {
                write!(f, "built with hash size {found}, configured {expected}")
            }
        }
    }
}

/// Insertion-ordered map from key to [`CacheEntry`] for one hash size.
///
/// Deleted entries become tombstones in place so iteration order stays
/// stable; they are skipped by lookups, iteration and [`save`](Self::save).
#[derive(Debug, Clone)]
pub struct FingerprintStore {
    hash_size: HashSize,
    slots: Vec<CacheEntry>,
    index: HashMap<String, usize>,
    discarded: Option<DiscardReason>,
}

impl FingerprintStore {
    /// Empty store for `hash_size`.
    #[must_use]
    pub fn new(hash_size: HashSize) -> Self {
        Self {
            hash_size,
            slots: Vec::new(),
            index: HashMap::new(),
            discarded: None,
        }
    }

    /// Load the cache at `path`, expecting fingerprints of `hash_size`.
    ///
    /// A missing file, an unrecognised header or a different hash size all
    /// yield an empty store; only a file that exists but cannot be read is
    /// an error. See [`discard_reason`](Self::discard_reason) to find out
    /// whether an existing cache was thrown away.
    pub fn load(path: &Path, hash_size: HashSize) -> StoreResult<Self> {
        let Some(data) = read_cache_file(path)? else {
            log::debug!("No cache at {}, starting empty", path.display());
            return Ok(Self::new(hash_size));
        };

        let store = Self::from_bytes(&data, hash_size);
        match store.discarded {
            Some(reason) => log::warn!(
                "Discarding fingerprint cache {}: {}",
                path.display(),
                reason
            ),
            None => log::debug!(
                "Loaded {} cached fingerprints from {}",
                store.len(),
                path.display()
            ),
        }
        Ok(store)
    }

    /// Load the cache at `path` with whatever hash size its header names.
    ///
    /// Returns `Ok(None)` when the file does not exist.
    pub fn load_any(path: &Path) -> StoreResult<Option<Self>> {
        let Some(data) = read_cache_file(path)? else {
            return Ok(None);
        };
        let found = data.first().copied().unwrap_or(0);
        let hash_size = HashSize::new(found).ok_or_else(|| StoreError::UnsupportedHashSize {
            path: path.to_path_buf(),
            found,
        })?;
        Ok(Some(Self::from_bytes(&data, hash_size)))
    }

    /// Parse a serialized cache.
    #[must_use]
    pub fn from_bytes(data: &[u8], hash_size: HashSize) -> Self {
        let mut store = Self::new(hash_size);

        if data.len() < HEADER_LEN {
            store.discarded = Some(DiscardReason::TruncatedHeader);
            return store;
        }
        let size_byte = data[0];
        if size_byte & RESERVED_BIT != 0 {
            store.discarded = Some(DiscardReason::ReservedBitSet(size_byte));
            return store;
        }
        if size_byte != hash_size.get() {
            store.discarded = Some(DiscardReason::HashSizeMismatch {
                found: size_byte,
                expected: hash_size,
            });
            return store;
        }

        let advertised = u32::from_be_bytes([data[1], data[2], data[3], data[4]]) as usize;
        let fp_len = hash_size.byte_len();
        let min_record = 1 + 4 + fp_len;
        let capacity = advertised.min((data.len() - HEADER_LEN) / min_record);
        store.slots.reserve(capacity);
        store.index.reserve(capacity);

        let mut rest = &data[HEADER_LEN..];
        while !rest.is_empty() {
            let Some((entry, tail)) = parse_record(rest, fp_len) else {
                log::warn!(
                    "Cache record {} is malformed, keeping the {} entries before it",
                    store.slots.len() + 1,
                    store.len()
                );
                break;
            };
            store.insert(entry);
            rest = tail;
        }

        if store.len() != advertised {
            log::debug!(
                "Cache header advertised {} entries, read {}",
                advertised,
                store.len()
            );
        }
        store
    }

    /// Serialize live entries in iteration order.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let body: usize = self
            .iter()
            .map(|e| e.key.len() + 1 + 4 + e.fingerprint.len())
            .sum();
        let mut out = Vec::with_capacity(HEADER_LEN + body);

        out.push(self.hash_size.get());
        out.extend_from_slice(&(self.len() as u32).to_be_bytes());
        for entry in self.iter() {
            out.extend_from_slice(entry.key.as_bytes());
            out.push(0);
            out.extend_from_slice(&entry.mod_time.to_be_bytes());
            out.extend_from_slice(entry.fingerprint.as_bytes());
        }
        out
    }

    /// Write the cache to `path`, replacing any existing file.
    ///
    /// The data goes to a sibling temporary file first and is renamed into
    /// place, so a failed save never leaves a half-written cache behind.
    pub fn save(&self, path: &Path) -> StoreResult<()> {
        let tmp = temp_path(path);
        let write_err = |source| StoreError::Write {
            path: path.to_path_buf(),
            source,
        };

        let result = (|| -> io::Result<()> {
            let mut writer = BufWriter::new(File::create(&tmp)?);
            writer.write_all(&self.to_bytes())?;
            writer.into_inner().map_err(|e| e.into_error())?.sync_all()?;
            fs::rename(&tmp, path)
        })();

        if let Err(source) = result {
            let _ = fs::remove_file(&tmp);
            return Err(write_err(source));
        }

        log::debug!("Saved {} fingerprints to {}", self.len(), path.display());
        Ok(())
    }

    /// Hash size every fingerprint in this store has.
    #[must_use]
    pub fn hash_size(&self) -> HashSize {
        self.hash_size
    }

    /// Why the file this store was loaded from was discarded, if it was.
    #[must_use]
    pub fn discard_reason(&self) -> Option<DiscardReason> {
        self.discarded
    }

    /// Number of live entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// True when there are no live entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Live entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &CacheEntry> + '_ {
        self.slots.iter().filter(|e| !e.is_tombstone())
    }

    /// Look up a key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&CacheEntry> {
        let key = normalize_key(key);
        self.index.get(key.as_ref()).map(|&slot| &self.slots[slot])
    }

    /// Insert or overwrite an entry.
    ///
    /// An empty fingerprint deletes the key. Any other length must match
    /// the store's hash size.
    pub fn put(&mut self, key: &str, fingerprint: Fingerprint, mod_time: u32) -> StoreResult<()> {
        if key.contains('\0') {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        if fingerprint.is_empty() {
            self.delete(key);
            return Ok(());
        }
        let expected = self.hash_size.byte_len();
        if fingerprint.len() != expected {
            return Err(StoreError::LengthMismatch {
                key: key.to_string(),
                expected,
                found: fingerprint.len(),
            });
        }

        let key = normalize_key(key).into_owned();
        self.insert(CacheEntry::new(key, fingerprint, mod_time));
        Ok(())
    }

    /// Move an entry to a new key, keeping its fingerprint and mod time.
    ///
    /// An existing entry under `new_key` is replaced. Returns false when
    /// `old_key` is not cached.
    pub fn rekey(&mut self, old_key: &str, new_key: &str) -> StoreResult<bool> {
        if new_key.contains('\0') {
            return Err(StoreError::InvalidKey(new_key.to_string()));
        }
        let old_key = normalize_key(old_key);
        let new_key = normalize_key(new_key).into_owned();
        if old_key == new_key.as_str() {
            return Ok(self.index.contains_key(new_key.as_str()));
        }

        let Some(slot) = self.index.remove(old_key.as_ref()) else {
            return Ok(false);
        };
        if let Some(replaced) = self.index.remove(&new_key) {
            self.slots[replaced].fingerprint = Fingerprint::tombstone();
        }
        self.slots[slot].key.clone_from(&new_key);
        self.index.insert(new_key, slot);
        self.compact_if_sparse();
        Ok(true)
    }

    /// Tombstone an entry. Returns false when the key is not cached.
    pub fn delete(&mut self, key: &str) -> bool {
        let key = normalize_key(key);
        match self.index.remove(key.as_ref()) {
            Some(slot) => {
                self.slots[slot].fingerprint = Fingerprint::tombstone();
                self.compact_if_sparse();
                true
            }
            None => false,
        }
    }

    /// Remove every entry.
    pub fn clear(&mut self) {
        self.slots.clear();
        self.index.clear();
    }

    /// Remove every entry and switch to a new hash size.
    pub fn reset(&mut self, hash_size: HashSize) {
        self.clear();
        self.hash_size = hash_size;
    }

    /// Drop entries whose key names a video (sampled at a frame index).
    ///
    /// Returns the number of entries removed.
    pub fn invalidate_videos(&mut self) -> usize {
        self.retain(|entry| MediaKind::from_name(&entry.key) != Some(MediaKind::Video))
            .len()
    }

    /// Apply a settings change to the cached data.
    pub fn apply_invalidation(&mut self, invalidation: Invalidation, hash_size: HashSize) {
        match invalidation {
            Invalidation::None => {}
            Invalidation::VideosOnly => {
                let removed = self.invalidate_videos();
                if removed > 0 {
                    log::info!("Dropped {removed} video fingerprints sampled at another frame");
                }
            }
            Invalidation::All => {
                log::info!(
                    "Hash size changed to {hash_size}, dropping {} cached fingerprints",
                    self.len()
                );
                self.reset(hash_size);
            }
        }
    }

    /// Keep only the entries `keep` accepts; returns the removed keys.
    pub fn retain(&mut self, mut keep: impl FnMut(&CacheEntry) -> bool) -> Vec<String> {
        let doomed: Vec<String> = self
            .iter()
            .filter(|entry| !keep(entry))
            .map(|entry| entry.key.clone())
            .collect();
        for key in &doomed {
            self.delete(key);
        }
        doomed
    }

    /// Drop entries whose file under `root` is gone or has been modified.
    ///
    /// Files that cannot be inspected for other reasons (permissions) are
    /// kept. Returns the removed keys.
    pub fn retain_existing(&mut self, root: &Path, fs: &dyn FileSystem) -> Vec<String> {
        self.retain(|entry| match fs.mod_time(&key_to_path(root, &entry.key)) {
            Ok(mod_time) => mod_time == entry.mod_time,
            Err(e) if e.kind() == io::ErrorKind::NotFound => false,
            Err(e) => {
                log::debug!("Keeping {}: {}", entry.key, e);
                true
            }
        })
    }

    fn insert(&mut self, entry: CacheEntry) {
        match self.index.get(&entry.key) {
            Some(&slot) => self.slots[slot] = entry,
            None => {
                self.index.insert(entry.key.clone(), self.slots.len());
                self.slots.push(entry);
            }
        }
    }

    /// Rebuild slots once tombstones outnumber live entries.
    fn compact_if_sparse(&mut self) {
        let dead = self.slots.len() - self.index.len();
        if dead < 64 || dead < self.index.len() {
            return;
        }
        self.slots.retain(|e| !e.is_tombstone());
        self.index.clear();
        for (slot, entry) in self.slots.iter().enumerate() {
            self.index.insert(entry.key.clone(), slot);
        }
    }
}

fn read_cache_file(path: &Path) -> StoreResult<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(data) => Ok(Some(data)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(StoreError::Read {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Parse one record, returning it with the unread remainder.
fn parse_record(data: &[u8], fp_len: usize) -> Option<(CacheEntry, &[u8])> {
    let nul = data.iter().position(|&b| b == 0)?;
    let key = std::str::from_utf8(&data[..nul]).ok()?;
    let rest = &data[nul + 1..];
    if rest.len() < 4 + fp_len {
        return None;
    }
    let mod_time = u32::from_be_bytes([rest[0], rest[1], rest[2], rest[3]]);
    let fingerprint = Fingerprint::from_bytes(rest[4..4 + fp_len].to_vec());
    let entry = CacheEntry::new(normalize_key(key).into_owned(), fingerprint, mod_time);
    Some((entry, &rest[4 + fp_len..]))
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
