//! Near-duplicate detection.
//!
//! This module provides:
//! - The [`DuplicateScanner`] state machine (see [`finder`])
//! - The report types a scan produces
//!
//! A scan runs `Idle -> Hashing -> Comparing -> Done`, or stops early in
//! `Cancelled`. Hashing fills the [`FingerprintStore`](crate::cache::FingerprintStore)
//! as it goes, so a cancelled scan keeps every fingerprint it computed.

pub mod finder;

use std::fmt;
use std::io;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

pub use finder::{CancelCadence, CancelCheck, DuplicateScanner, ScanConfig, DEFAULT_CANCEL_INTERVAL};

use crate::cache::StoreError;
use crate::fingerprint::DecodeCause;

/// Where a [`DuplicateScanner`] is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanState {
    /// No scan has started.
    #[default]
    Idle,
    /// Looking up or computing fingerprints.
    Hashing,
    /// Comparing every pair of fingerprints.
    Comparing,
    /// Finished normally.
    Done,
    /// Stopped by the cancel check.
    Cancelled,
}

impl ScanState {
    /// True once the scan can make no further progress.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Cancelled)
    }
}

impl fmt::Display for ScanState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Hashing => "hashing",
            Self::Comparing => "comparing",
            Self::Done => "done",
            Self::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Two candidates whose fingerprints are within the threshold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicatePair {
    /// Key of the earlier candidate.
    pub first: String,
    /// Key of the later candidate.
    pub second: String,
    /// Position of `first` in the candidate list.
    pub first_index: usize,
    /// Position of `second` in the candidate list.
    pub second_index: usize,
    /// Hamming distance between the two fingerprints.
    pub distance: u32,
}

/// Why a candidate was left out of the comparison.
#[derive(Debug, Error)]
pub enum FileError {
    /// The file disappeared; its cache entry has been dropped.
    #[error("file not found")]
    Missing,

    /// The file's metadata could not be read.
    #[error("cannot read metadata: {0}")]
    Stat(#[source] io::Error),

    /// The file could not be decoded.
    #[error(transparent)]
    Decode(DecodeCause),

    /// The fingerprint could not be stored.
    #[error(transparent)]
    Store(StoreError),
}

/// A candidate that could not be fingerprinted.
#[derive(Debug)]
pub struct ScanFailure {
    /// Candidate key.
    pub key: String,
    /// Candidate path.
    pub path: PathBuf,
    /// What went wrong.
    pub error: FileError,
}

/// Counters collected during a scan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanStats {
    /// Candidates handed to the scan.
    pub candidates: usize,
    /// Candidates with a usable fingerprint.
    pub hashed: usize,
    /// Fingerprints reused from the cache.
    pub cache_hits: usize,
    /// Fingerprints computed from the file.
    pub cache_misses: usize,
    /// Candidates that failed.
    pub failed: usize,
    /// Pairs compared.
    pub comparisons: u64,
}

/// Result of a completed scan.
#[derive(Debug, Default)]
pub struct ScanReport {
    /// Matching pairs in ascending `(first_index, second_index)` order.
    pub pairs: Vec<DuplicatePair>,
    /// Candidates that were left out of the comparison.
    pub failures: Vec<ScanFailure>,
    /// Counters.
    pub stats: ScanStats,
}

impl ScanReport {
    /// True when at least one pair was found.
    #[must_use]
    pub fn has_duplicates(&self) -> bool {
        !self.pairs.is_empty()
    }

    /// True when some candidates failed.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }
}

/// How a scan ended.
#[derive(Debug)]
pub enum ScanOutcome {
    /// Every phase ran to completion.
    Done(ScanReport),
    /// The cancel check fired. Results are discarded; fingerprints
    /// computed so far are already in the store.
    Cancelled(ScanStats),
}

impl ScanOutcome {
    /// The report, if the scan finished.
    #[must_use]
    pub fn report(&self) -> Option<&ScanReport> {
        match self {
            Self::Done(report) => Some(report),
            Self::Cancelled(_) => None,
        }
    }

    /// True for [`ScanOutcome::Cancelled`].
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }

    /// Counters, whichever way the scan ended.
    #[must_use]
    pub fn stats(&self) -> &ScanStats {
        match self {
            Self::Done(report) => &report.stats,
            Self::Cancelled(stats) => stats,
        }
    }
}
