//! Portable cache keys.
//!
//! A key is a path relative to the collection root, with components joined
//! by `/` on every platform and normalised to Unicode NFC, so a cache
//! written on Windows or macOS still matches on Linux.
//!
//! ```
//! use imgsift::cache::key::normalize_key;
//!
//! // macOS hands out decomposed (NFD) names
//! assert_eq!(normalize_key("cafe\u{0301}/a.png"), "café/a.png");
//! ```

use std::borrow::Cow;
use std::path::{Component, Path};

use unicode_normalization::{is_nfc, UnicodeNormalization};

/// Canonical key separator.
pub const KEY_SEPARATOR: char = '/';

/// Normalise a key to NFC with the canonical separator.
///
/// On Windows, `\` is treated as a separator and rewritten; elsewhere it is
/// a legal file name character and left alone.
#[must_use]
pub fn normalize_key(key: &str) -> Cow<'_, str> {
    let needs_separator_fix = cfg!(windows) && key.contains('\\');
    if !needs_separator_fix && is_nfc(key) {
        return Cow::Borrowed(key);
    }

    let mut normalized: String = key.nfc().collect();
    if needs_separator_fix {
        normalized = normalized.replace('\\', "/");
    }
    Cow::Owned(normalized)
}

/// Build the key of `path` relative to `root`.
///
/// Returns `None` when `path` is not under `root` or is not valid UTF-8.
#[must_use]
pub fn relative_key(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_str()?),
            Component::CurDir => {}
            _ => return None,
        }
    }
    if parts.is_empty() {
        return None;
    }
    Some(normalize_key(&parts.join("/")).into_owned())
}

/// Resolve a key back to a path under `root`.
#[must_use]
pub fn key_to_path(root: &Path, key: &str) -> std::path::PathBuf {
    key.split(KEY_SEPARATOR)
        .filter(|part| !part.is_empty())
        .fold(root.to_path_buf(), |path, part| path.join(part))
}
