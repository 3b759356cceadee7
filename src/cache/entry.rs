//! Cache entry definitions.

use serde::Serialize;

use crate::fingerprint::Fingerprint;

/// A single file in the fingerprint cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// Portable key (see [`crate::cache::key`]).
    pub key: String,
    /// Packed dHash; empty for a tombstone.
    pub fingerprint: Fingerprint,
    /// Modification time in Unix seconds, truncated to 32 bits.
    pub mod_time: u32,
}

impl CacheEntry {
    /// Create an entry.
    #[must_use]
    pub fn new(key: impl Into<String>, fingerprint: Fingerprint, mod_time: u32) -> Self {
        Self {
            key: key.into(),
            fingerprint,
            mod_time,
        }
    }

    /// True for entries that must not be persisted.
    #[must_use]
    pub fn is_tombstone(&self) -> bool {
        self.fingerprint.is_empty()
    }

    /// Whether the cached fingerprint still describes a file with `current_mod_time`.
    #[must_use]
    pub fn is_fresh(&self, current_mod_time: u32) -> bool {
        !self.is_tombstone() && self.mod_time == current_mod_time
    }
}

/// Serializable view of an entry, used by `imgsift inspect --json`.
#[derive(Debug, Serialize)]
pub struct EntryView<'a> {
    /// Entry key.
    pub key: &'a str,
    /// Modification time in Unix seconds.
    pub mod_time: u32,
    /// Hex-encoded fingerprint.
    pub fingerprint: String,
}

impl<'a> From<&'a CacheEntry> for EntryView<'a> {
    fn from(entry: &'a CacheEntry) -> Self {
        Self {
            key: &entry.key,
            mod_time: entry.mod_time,
            fingerprint: entry.fingerprint.to_hex(),
        }
    }
}
