//! Perceptual fingerprints for images and video frames.
//!
//! A fingerprint is a horizontal difference hash (dHash): the source is
//! downsampled to a `(n + 1) x n` grayscale grid and every row contributes
//! `n` bits, one per pair of horizontally adjacent pixels. The bits are
//! packed row-major, most significant bit first, into `n² / 8` bytes.
//!
//! # Architecture
//!
//! * [`codec`]: [`PixelGrid`], the dHash itself and [`FingerprintCodec`],
//!   which picks the right decoding collaborator for a path.
//! * [`decode`]: the collaborators that turn files into pixel grids
//!   (still images through `image`, GIF frames, and FFmpeg for video when
//!   the `video` feature is enabled).

pub mod codec;
pub mod decode;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use codec::{dhash, FingerprintCodec, PixelGrid};
pub use decode::{
    DecodeCause, DecodeError, FrameExtractor, ImageDecoder, MediaFrameExtractor, StdImageDecoder,
};

/// Smallest supported grid size.
pub const MIN_HASH_SIZE: u8 = 4;
/// Largest supported grid size.
pub const MAX_HASH_SIZE: u8 = 32;
/// Grid sizes move in steps of this value so `n²` is always a whole number of bytes.
pub const HASH_SIZE_STEP: u8 = 4;
/// Grid size used when nothing else is configured.
pub const DEFAULT_HASH_SIZE: u8 = 8;

/// Side length of the dHash grid.
///
/// Always a multiple of [`HASH_SIZE_STEP`] within
/// [`MIN_HASH_SIZE`]`..=`[`MAX_HASH_SIZE`], which keeps the reserved high
/// bit of the cache header clear.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct HashSize(u8);

impl HashSize {
    /// Validate a raw grid size.
    #[must_use]
    pub fn new(size: u8) -> Option<Self> {
        let valid = (MIN_HASH_SIZE..=MAX_HASH_SIZE).contains(&size) && size % HASH_SIZE_STEP == 0;
        valid.then_some(Self(size))
    }

    /// Clamp an arbitrary value onto the nearest valid grid size at or below it.
    #[must_use]
    pub fn clamped(size: u8) -> Self {
        let size = size.clamp(MIN_HASH_SIZE, MAX_HASH_SIZE);
        Self(size - size % HASH_SIZE_STEP)
    }

    /// The raw grid size.
    #[must_use]
    pub fn get(self) -> u8 {
        self.0
    }

    /// Number of bits in a fingerprint of this size.
    #[must_use]
    pub fn bit_len(self) -> usize {
        usize::from(self.0) * usize::from(self.0)
    }

    /// Number of bytes in a fingerprint of this size.
    #[must_use]
    pub fn byte_len(self) -> usize {
        self.bit_len() / 8
    }

    /// Largest meaningful duplicate threshold for this size (half the bits).
    #[must_use]
    pub fn max_threshold(self) -> u32 {
        (self.bit_len() / 2) as u32
    }
}

impl Default for HashSize {
    fn default() -> Self {
        Self(DEFAULT_HASH_SIZE)
    }
}

impl fmt::Display for HashSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<u8> for HashSize {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value).ok_or_else(|| {
            format!(
                "hash size must be a multiple of {HASH_SIZE_STEP} between {MIN_HASH_SIZE} and {MAX_HASH_SIZE}, got {value}"
            )
        })
    }
}

impl From<HashSize> for u8 {
    fn from(size: HashSize) -> Self {
        size.0
    }
}

/// A packed dHash bit vector.
///
/// An empty fingerprint is a tombstone: the cache keeps the slot but never
/// writes it to disk.
#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct Fingerprint(Vec<u8>);

impl Fingerprint {
    /// Wrap already packed bytes.
    #[must_use]
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// The tombstone value.
    #[must_use]
    pub fn tombstone() -> Self {
        Self(Vec::new())
    }

    /// Packed bytes, most significant bit first.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True for tombstones.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Read a single bit (row-major index).
    #[must_use]
    pub fn bit(&self, index: usize) -> bool {
        self.0
            .get(index / 8)
            .is_some_and(|byte| byte & (0x80 >> (index % 8)) != 0)
    }

    /// Lowercase hex rendering.
    #[must_use]
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            write!(f, "Fingerprint(<tombstone>)")
        } else {
            write!(f, "Fingerprint({})", self.to_hex())
        }
    }
}

impl From<Vec<u8>> for Fingerprint {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for Fingerprint {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}
