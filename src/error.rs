//! Exit codes and structured error output.

use serde::Serialize;

use crate::cache::StoreError;

/// Process exit codes.
///
/// - 0: duplicates found
/// - 1: general error (including a cache that could not be saved)
/// - 2: no duplicates found
/// - 3: completed, but some files could not be fingerprinted
/// - 130: cancelled with Ctrl+C (the cache is still saved)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExitCode {
    /// Scan completed and duplicates were found (or a maintenance command succeeded).
    Success = 0,
    /// An error stopped the command.
    GeneralError = 1,
    /// Scan completed but found no duplicates.
    NoDuplicates = 2,
    /// Scan completed but some files failed to decode.
    PartialSuccess = 3,
    /// Scan was cancelled by the user.
    Interrupted = 130,
}

impl ExitCode {
    /// Numeric exit code.
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Machine-readable code prefix.
    #[must_use]
    pub fn code_prefix(self) -> &'static str {
        match self {
            Self::Success => "IS000",
            Self::GeneralError => "IS001",
            Self::NoDuplicates => "IS002",
            Self::PartialSuccess => "IS003",
            Self::Interrupted => "IS130",
        }
    }
}

/// Structured error information for `--json-errors`.
#[derive(Debug, Serialize)]
pub struct StructuredError {
    /// The error code (e.g. "IS001")
    pub code: String,
    /// The exit code number
    pub exit_code: i32,
    /// Human-readable error message, including its causes
    pub message: String,
    /// Set when the failure was saving the fingerprint cache
    pub cache_lost: bool,
}

impl StructuredError {
    /// Describe `err` for JSON output.
    #[must_use]
    pub fn new(err: &anyhow::Error, exit_code: ExitCode) -> Self {
        Self {
            code: exit_code.code_prefix().to_string(),
            exit_code: exit_code.as_i32(),
            message: format!("{err:#}"),
            cache_lost: err
                .chain()
                .any(|cause| matches!(cause.downcast_ref::<StoreError>(), Some(StoreError::Write { .. }))),
        }
    }
}
