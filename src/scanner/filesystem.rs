//! Filesystem metadata used for cache staleness checks.

use std::io;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

/// Source of file modification times.
///
/// The scanner only needs `stat`; keeping it behind a trait lets tests
/// drive staleness without touching real files.
pub trait FileSystem: Send + Sync {
    /// Modification time in whole Unix seconds, truncated to 32 bits.
    ///
    /// Fails with [`io::ErrorKind::NotFound`] when the file is gone.
    fn mod_time(&self, path: &Path) -> io::Result<u32>;
}

/// [`FileSystem`] backed by `std::fs`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdFileSystem;

impl FileSystem for StdFileSystem {
    fn mod_time(&self, path: &Path) -> io::Result<u32> {
        let modified = std::fs::metadata(path)?.modified()?;
        Ok(mod_time_secs(modified))
    }
}

/// Convert a timestamp to the cache's 32-bit seconds representation.
///
/// Times before the epoch are floored to whole seconds and wrap the same
/// way a signed-to-unsigned cast does, so round-tripping a value through
/// the cache always compares equal.
#[must_use]
pub fn mod_time_secs(time: SystemTime) -> u32 {
    let secs: i64 = match time.duration_since(UNIX_EPOCH) {
        Ok(after) => after.as_secs() as i64,
        Err(before) => {
            let d = before.duration();
            -(d.as_secs() as i64 + i64::from(d.subsec_nanos() > 0))
        }
    };
    secs as u32
}
