//! JSON output formatter for scan results.
//!
//! # Output Schema
//!
//! ```json
//! {
//!   "pairs": [
//!     { "first": "cats/a.png", "second": "cats/b.png",
//!       "first_index": 0, "second_index": 1, "distance": 3 }
//!   ],
//!   "failures": [
//!     { "key": "cats/broken.jpg", "path": "/photos/cats/broken.jpg",
//!       "cause": "unsupported format: ..." }
//!   ],
//!   "stats": {
//!     "candidates": 3, "hashed": 2, "cache_hits": 1, "cache_misses": 1,
//!     "failed": 1, "comparisons": 1
//!   }
//! }
//! ```

use std::io::Write;

use serde::Serialize;

use super::OutputError;
use crate::duplicates::{DuplicatePair, ScanFailure, ScanReport, ScanStats};

/// A failed candidate in JSON form.
#[derive(Debug, Clone, Serialize)]
pub struct JsonFailure {
    /// Cache key
    pub key: String,
    /// Path on disk
    pub path: String,
    /// Human-readable cause
    pub cause: String,
}

impl From<&ScanFailure> for JsonFailure {
    fn from(failure: &ScanFailure) -> Self {
        Self {
            key: failure.key.clone(),
            path: failure.path.to_string_lossy().into_owned(),
            cause: failure.error.to_string(),
        }
    }
}

/// Complete JSON output structure.
#[derive(Debug, Clone, Serialize)]
pub struct JsonOutput {
    /// Duplicate pairs in comparison order
    pub pairs: Vec<DuplicatePair>,
    /// Files left out of the comparison
    pub failures: Vec<JsonFailure>,
    /// Scan counters
    pub stats: ScanStats,
}

impl JsonOutput {
    /// Build the document for a finished scan.
    #[must_use]
    pub fn new(report: &ScanReport) -> Self {
        Self {
            pairs: report.pairs.clone(),
            failures: report.failures.iter().map(JsonFailure::from).collect(),
            stats: report.stats.clone(),
        }
    }

    /// Serialize to compact JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Serialize to pretty-printed JSON.
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Write the document followed by a newline.
    pub fn write_to<W: Write>(&self, writer: &mut W, pretty: bool) -> Result<(), OutputError> {
        let json = if pretty {
            self.to_json_pretty()?
        } else {
            self.to_json()?
        };
        writer.write_all(json.as_bytes())?;
        writer.write_all(b"\n")?;
        Ok(())
    }
}
