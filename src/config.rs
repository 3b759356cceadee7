//! Application configuration management.
//!
//! Settings are layered with figment, later layers winning:
//!
//! 1. built-in defaults
//! 2. a TOML file (`--config PATH`, else the platform config directory)
//! 3. environment variables prefixed with `IMGSIFT_`
//! 4. command-line flags, applied by the caller
//!
//! ```toml
//! hash_size = 8    # dHash grid side, multiple of 4 in 4..=32
//! hash_diff = 12   # largest Hamming distance reported as a duplicate
//! anim_frame = 0   # frame sampled from GIFs and videos
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::fingerprint::{HashSize, DEFAULT_HASH_SIZE};

/// Prefix for environment variable overrides.
pub const ENV_PREFIX: &str = "IMGSIFT_";

/// Name of the settings file inside the config directory.
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Errors loading or saving settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A layer contained a value of the wrong type, or the file is not TOML.
    #[error("Invalid configuration: {0}")]
    Extract(#[from] figment::Error),

    /// Settings could not be encoded.
    #[error("Failed to encode configuration: {0}")]
    Encode(#[from] toml::ser::Error),

    /// The settings file could not be written.
    #[error("Failed to write configuration {}: {source}", path.display())]
    Write {
        /// Settings file path
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: io::Error,
    },

    /// No platform config directory exists for this user.
    #[error("Cannot determine the configuration directory")]
    NoConfigDir,
}

/// What a settings change does to cached fingerprints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Invalidation {
    /// Cached fingerprints are still valid.
    None,
    /// Fingerprints of videos were sampled at another frame.
    VideosOnly,
    /// Every fingerprint has the wrong size.
    All,
}

/// User-tunable scan settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Side of the dHash grid.
    pub hash_size: u8,
    /// Largest Hamming distance reported as a duplicate.
    pub hash_diff: u16,
    /// Frame index sampled from animations and videos.
    pub anim_frame: u16,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            hash_size: DEFAULT_HASH_SIZE,
            hash_diff: 12,
            anim_frame: 0,
        }
    }
}

impl Settings {
    /// Default settings file location for this platform.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "imgsift").map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
    }

    /// The layered provider for `path` (or the default location).
    #[must_use]
    pub fn figment(path: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(file) = path.map(Path::to_path_buf).or_else(Self::default_path) {
            figment = figment.merge(Toml::file(file));
        }
        figment.merge(Env::prefixed(ENV_PREFIX))
    }

    /// Load and normalise settings. A missing file just means defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let settings: Self = Self::figment(path).extract()?;
        Ok(settings.normalized())
    }

    /// Clamp every field onto its valid range.
    #[must_use]
    pub fn normalized(self) -> Self {
        let hash_size = HashSize::clamped(self.hash_size);
        if hash_size.get() != self.hash_size {
            log::warn!(
                "hash_size {} is not supported, using {}",
                self.hash_size,
                hash_size
            );
        }

        let max_diff = u16::try_from(hash_size.max_threshold()).unwrap_or(u16::MAX);
        let hash_diff = self.hash_diff.min(max_diff);
        if hash_diff != self.hash_diff {
            log::warn!(
                "hash_diff {} exceeds half of the {} fingerprint bits, using {}",
                self.hash_diff,
                hash_size.bit_len(),
                hash_diff
            );
        }

        Self {
            hash_size: hash_size.get(),
            hash_diff,
            anim_frame: self.anim_frame,
        }
    }

    /// Validated grid size.
    #[must_use]
    pub fn hash_size(&self) -> HashSize {
        HashSize::clamped(self.hash_size)
    }

    /// Duplicate threshold as a bit count.
    #[must_use]
    pub fn threshold(&self) -> u32 {
        u32::from(self.hash_diff)
    }

    /// How the cache must react to switching from `previous` to `self`.
    #[must_use]
    pub fn invalidation_from(&self, previous: &Self) -> Invalidation {
        if self.hash_size() != previous.hash_size() {
            Invalidation::All
        } else if self.anim_frame != previous.anim_frame {
            Invalidation::VideosOnly
        } else {
            Invalidation::None
        }
    }

    /// How a cache built at `hash_size`, with video entries sampled at
    /// `sampled_frame`, must react to being used with these settings.
    ///
    /// An unknown frame (`None`) means video entries cannot be trusted.
    #[must_use]
    pub fn cache_invalidation(&self, hash_size: HashSize, sampled_frame: Option<u16>) -> Invalidation {
        let cached = Self {
            hash_size: hash_size.get(),
            anim_frame: sampled_frame.unwrap_or(self.anim_frame),
            ..*self
        };
        match self.invalidation_from(&cached) {
            Invalidation::None if sampled_frame.is_none() => Invalidation::VideosOnly,
            invalidation => invalidation,
        }
    }

    /// Write the settings as TOML, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let write_err = |source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(write_err)?;
        }
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content).map_err(write_err)?;
        log::debug!("Saved settings to {}", path.display());
        Ok(())
    }
}
