//! The failed-file list.
//!
//! One line per file that could not be fingerprinted: its key relative to
//! the collection root, a tab, and the cause. The list is rewritten on every scan that has failures.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use super::OutputError;
use crate::duplicates::ScanFailure;

/// File name of the list inside a collection root.
pub const FAILED_LIST_NAME: &str = "failed.txt";

/// Write `failures` to `writer`.
pub fn write_failures<W: Write>(writer: &mut W, failures: &[ScanFailure]) -> Result<(), OutputError> {
    for failure in failures {
        let cause = failure.error.to_string().replace(['\t', '\n'], " ");
        writeln!(writer, "{}\t{}", failure.key, cause)?;
    }
    Ok(())
}

/// Replace the file at `path` with the list of `failures`.
pub fn write_failed_list(path: &Path, failures: &[ScanFailure]) -> Result<(), OutputError> {
    let mut writer = BufWriter::new(File::create(path)?);
    write_failures(&mut writer, failures)?;
    writer.flush()?;
    log::info!("Wrote {} failed files to {}", failures.len(), path.display());
    Ok(())
}
