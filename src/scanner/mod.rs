//! Candidate discovery and filesystem access.
//!
//! This module provides functionality for:
//! - Classifying files as still images or videos by extension
//! - Listing the candidate files of a collection (see [`walker`])
//! - Reading modification times through a swappable [`FileSystem`]
//!
//! # Example
//!
//! ```no_run
//! use imgsift::scanner::{collect_candidates, CandidateScope};
//! use std::path::Path;
//!
//! let candidates = collect_candidates(Path::new("photos"), &CandidateScope::AllFolders)?;
//! for candidate in &candidates {
//!     println!("{}", candidate.key);
//! }
//! # Ok::<(), imgsift::scanner::ScanError>(())
//! ```

pub mod filesystem;
pub mod walker;

use std::path::{Path, PathBuf};

pub use filesystem::{mod_time_secs, FileSystem, StdFileSystem};
pub use walker::{collect_candidates, CandidateScope};

/// Extensions decoded as still images.
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp"];

/// Extensions sampled at the configured animation frame.
pub const VIDEO_EXTENSIONS: &[&str] = &["gif", "mp4", "webm", "mov"];

/// How a file is turned into pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    /// A single still image.
    Image,
    /// An animation or video, sampled at one frame.
    Video,
}

impl MediaKind {
    /// Classify a file name or cache key by extension (case-insensitive).
    ///
    /// Returns `None` for unsupported or missing extensions.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        let (_, ext) = name.rsplit_once('.')?;
        let ext = ext.to_ascii_lowercase();
        if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            Some(Self::Image)
        } else if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
            Some(Self::Video)
        } else {
            None
        }
    }

    /// Classify a path by extension.
    #[must_use]
    pub fn from_path(path: &Path) -> Option<Self> {
        path.file_name()
            .and_then(|name| name.to_str())
            .and_then(Self::from_name)
    }
}

/// A file taking part in a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// Portable cache key (relative to the collection root, `/`-separated).
    pub key: String,
    /// Where the file actually lives.
    pub path: PathBuf,
}

impl Candidate {
    /// Create a candidate.
    #[must_use]
    pub fn new(key: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            key: key.into(),
            path: path.into(),
        }
    }
}

/// Errors that can occur while listing a collection.
#[derive(thiserror::Error, Debug)]
pub enum ScanError {
    /// The specified path was not found.
    #[error("Path not found: {0}")]
    NotFound(PathBuf),

    /// The specified path is not a directory.
    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),

    /// An I/O error occurred while accessing a file.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },
}
