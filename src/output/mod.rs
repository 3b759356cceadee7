//! Output formatters for scan results.
//!
//! - [`text`]: one coloured line per duplicate pair, for people
//! - [`json`]: a single document with pairs, failures and counters, for scripts
//! - [`failed`]: the `path<TAB>cause` list of files that could not be decoded
//!
//! # Example
//!
//! ```no_run
//! use imgsift::duplicates::ScanReport;
//! use imgsift::output::json::JsonOutput;
//!
//! let report = ScanReport::default();
//! let output = JsonOutput::new(&report);
//! println!("{}", output.to_json_pretty().unwrap());
//! ```

pub mod failed;
pub mod json;
pub mod text;

pub use failed::{write_failed_list, FAILED_LIST_NAME};
pub use json::JsonOutput;
pub use text::TextOutput;

/// Errors that can occur while writing output.
#[derive(thiserror::Error, Debug)]
pub enum OutputError {
    /// JSON serialization error
    #[error("JSON serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error while writing
    #[error("I/O error while writing output: {0}")]
    Io(#[from] std::io::Error),
}
