//! Candidate discovery for a collection.
//!
//! # Overview
//!
//! A collection is a root directory whose sub-folders hold media files.
//! A scan either looks at a single folder (non-recursively) or at every
//! file one level inside every sub-folder of the root. Folders named
//! `Trash`, or starting with `.` or `$`, are never part of an all-folder
//! scan.
//!
//! Only files with a supported extension (see [`MediaKind`]) become
//! candidates. Candidates are returned sorted by their cache key.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use super::{Candidate, MediaKind, ScanError};
use crate::cache::key::relative_key;

/// Folder that receives rejected files and is never scanned.
pub const TRASH_FOLDER: &str = "Trash";

/// Which part of a collection a scan covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CandidateScope {
    /// Files directly inside one folder, relative to the root (`.` for the root itself).
    Folder(PathBuf),
    /// Files one level inside every eligible sub-folder of the root.
    AllFolders,
}

/// List the candidates of `root` covered by `scope`.
///
/// # Errors
///
/// Fails if the root (or the chosen folder) is missing or not a directory,
/// or if a directory cannot be read.
pub fn collect_candidates(root: &Path, scope: &CandidateScope) -> Result<Vec<Candidate>, ScanError> {
    check_dir(root)?;

    let mut candidates = match scope {
        CandidateScope::Folder(folder) => {
            let dir = root.join(folder);
            check_dir(&dir)?;
            files_in(root, &dir)?
        }
        CandidateScope::AllFolders => {
            let mut all = Vec::new();
            for folder in eligible_folders(root)? {
                all.extend(files_in(root, &folder)?);
            }
            all
        }
    };

    candidates.sort_by(|a, b| a.key.cmp(&b.key));
    log::debug!(
        "Found {} candidates under {} ({:?})",
        candidates.len(),
        root.display(),
        scope
    );
    Ok(candidates)
}

/// True for sub-folders an all-folder scan should visit.
#[must_use]
pub fn is_eligible_folder(name: &str) -> bool {
    name != TRASH_FOLDER && !name.starts_with('.') && !name.starts_with('$')
}

fn check_dir(path: &Path) -> Result<(), ScanError> {
    match std::fs::metadata(path) {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(ScanError::NotADirectory(path.to_path_buf())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(ScanError::NotFound(path.to_path_buf()))
        }
        Err(source) => Err(ScanError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn eligible_folders(root: &Path) -> Result<Vec<PathBuf>, ScanError> {
    let mut folders = Vec::new();
    for entry in WalkDir::new(root).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|e| walk_error(root, e))?;
        if !entry.file_type().is_dir() {
            continue;
        }
        let eligible = entry.file_name().to_str().is_some_and(is_eligible_folder);
        if eligible {
            folders.push(entry.into_path());
        } else {
            log::trace!("Skipping folder {}", entry.path().display());
        }
    }
    Ok(folders)
}

fn files_in(root: &Path, dir: &Path) -> Result<Vec<Candidate>, ScanError> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|e| walk_error(dir, e))?;
        if !entry.file_type().is_file() || MediaKind::from_path(entry.path()).is_none() {
            continue;
        }
        match relative_key(root, entry.path()) {
            Some(key) => files.push(Candidate::new(key, entry.into_path())),
            None => log::warn!("Skipping non-UTF-8 path {}", entry.path().display()),
        }
    }
    Ok(files)
}

fn walk_error(dir: &Path, error: walkdir::Error) -> ScanError {
    let path = error.path().unwrap_or(dir).to_path_buf();
    match error.into_io_error() {
        Some(source) => ScanError::Io { path, source },
        None => ScanError::NotFound(path),
    }
}
