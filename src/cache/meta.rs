//! Sidecar describing how a cache's video fingerprints were sampled.
//!
//! The binary cache format has no room for the animation frame, so it is
//! kept in a small TOML file next to the cache (`imgSort.cache.meta`).
//! A cache without a readable sidecar has video entries of unknown
//! provenance; callers treat them as stale.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::store::{StoreError, StoreResult};

/// Suffix appended to the cache file name.
pub const META_SUFFIX: &str = ".meta";

/// Sampling parameters recorded alongside a cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheMeta {
    /// Frame index video entries were fingerprinted at.
    pub anim_frame: u16,
}

impl CacheMeta {
    /// Sidecar location for the cache at `cache_path`.
    #[must_use]
    pub fn path_for(cache_path: &Path) -> PathBuf {
        let mut name = cache_path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(META_SUFFIX);
        cache_path.with_file_name(name)
    }

    /// Read the sidecar of `cache_path`.
    ///
    /// Returns `None` when it is missing or unreadable.
    #[must_use]
    pub fn load(cache_path: &Path) -> Option<Self> {
        let path = Self::path_for(cache_path);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
            Err(e) => {
                log::warn!("Cannot read {}: {}", path.display(), e);
                return None;
            }
        };
        match toml::from_str(&content) {
            Ok(meta) => Some(meta),
            Err(e) => {
                log::warn!("Ignoring malformed {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Write the sidecar of `cache_path`.
    pub fn save(&self, cache_path: &Path) -> StoreResult<()> {
        let path = Self::path_for(cache_path);
        let written = toml::to_string(self)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
            .and_then(|content| fs::write(&path, content));
        if let Err(source) = written {
            return Err(StoreError::Write { path, source });
        }
        log::debug!("Recorded frame {} in {}", self.anim_frame, path.display());
        Ok(())
    }

    /// Delete the sidecar of `cache_path`, if any.
    pub fn remove(cache_path: &Path) {
        let path = Self::path_for(cache_path);
        if let Err(e) = fs::remove_file(&path) {
            if e.kind() != io::ErrorKind::NotFound {
                log::warn!("Cannot remove {}: {}", path.display(), e);
            }
        }
    }
}
