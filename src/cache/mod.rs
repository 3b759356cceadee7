//! Fingerprint caching.
//!
//! Computing a fingerprint means decoding a whole image (or seeking into a
//! video), so fingerprints are kept in a single binary file per
//! collection and reused until the file they describe changes.
//!
//! # Architecture
//!
//! * [`store`]: [`FingerprintStore`], the in-memory map and its on-disk format.
//! * [`entry`]: [`CacheEntry`], one cached file, and its serialisable view.
//! * [`key`]: portable keys (root-relative, `/`-separated, NFC).
//! * [`meta`]: [`CacheMeta`], the frame video entries were sampled at.
//!
//! # Cache Invalidation
//!
//! An entry is reused only when the file's current modification time
//! (whole seconds, truncated to 32 bits) equals the cached one. Changing
//! the hash size invalidates the whole cache; changing the sampled video
//! frame invalidates only video entries; the frame in use is recorded in
//! the [`CacheMeta`] sidecar so a change is noticed however it was made.

pub mod entry;
pub mod key;
pub mod meta;
pub mod store;

use std::path::{Path, PathBuf};

pub use entry::{CacheEntry, EntryView};
pub use key::{key_to_path, normalize_key, relative_key};
pub use meta::CacheMeta;
pub use store::{DiscardReason, FingerprintStore, StoreError, StoreResult};

/// File name of the cache inside a collection root.
pub const CACHE_FILE_NAME: &str = "imgSort.cache";

/// Default cache location for a collection.
#[must_use]
pub fn default_cache_path(root: &Path) -> PathBuf {
    root.join(CACHE_FILE_NAME)
}
