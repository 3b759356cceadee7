//! Difference hashing and the codec that feeds it.

use std::path::Path;
use std::sync::Arc;

use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage};

use super::decode::{
    DecodeError, FrameExtractor, ImageDecoder, MediaFrameExtractor, StdImageDecoder,
};
use super::{Fingerprint, HashSize};
use crate::scanner::MediaKind;

/// An 8-bit grayscale sample grid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelGrid(GrayImage);

impl PixelGrid {
    /// Build a grid from row-major luma samples.
    ///
    /// Returns `None` for empty dimensions or when `samples` does not hold
    /// exactly `width * height` values.
    #[must_use]
    pub fn new(width: u32, height: u32, samples: Vec<u8>) -> Option<Self> {
        if width == 0 || height == 0 {
            return None;
        }
        GrayImage::from_raw(width, height, samples)
            .filter(|img| img.len() == width as usize * height as usize)
            .map(Self)
    }

    /// Convert any decoded image to grayscale.
    #[must_use]
    pub fn from_image(img: &DynamicImage) -> Option<Self> {
        if img.width() == 0 || img.height() == 0 {
            return None;
        }
        Some(Self(img.to_luma8()))
    }

    /// Grid width in samples.
    #[must_use]
    pub fn width(&self) -> u32 {
        self.0.width()
    }

    /// Grid height in samples.
    #[must_use]
    pub fn height(&self) -> u32 {
        self.0.height()
    }

    /// Sample at column `x`, row `y`.
    ///
    /// # Panics
    ///
    /// Panics if the coordinates are out of bounds.
    #[must_use]
    pub fn sample(&self, x: u32, y: u32) -> u8 {
        self.0.get_pixel(x, y)[0]
    }
}

/// Compute the horizontal difference hash of `grid`.
///
/// The grid is resampled to `(n + 1) x n` (skipped when it already has that
/// shape). Bit `i` of row `r` is set when sample `(i + 1, r)` is brighter
/// than `(i, r)`.
#[must_use]
pub fn dhash(grid: &PixelGrid, hash_size: HashSize) -> Fingerprint {
    let n = u32::from(hash_size.get());

    let resized;
    let small = if grid.width() == n + 1 && grid.height() == n {
        &grid.0
    } else {
        resized = imageops::resize(&grid.0, n + 1, n, FilterType::Lanczos3);
        &resized
    };

    let mut bytes = vec![0u8; hash_size.byte_len()];
    let mut bit = 0usize;
    for y in 0..n {
        for x in 0..n {
            if small.get_pixel(x + 1, y)[0] > small.get_pixel(x, y)[0] {
                bytes[bit / 8] |= 0x80 >> (bit % 8);
            }
            bit += 1;
        }
    }

    Fingerprint::from_bytes(bytes)
}

/// Turns files into fingerprints.
///
/// Still images go through the [`ImageDecoder`]; animated images and videos
/// go through the [`FrameExtractor`] at the configured frame index.
#[derive(Clone)]
pub struct FingerprintCodec {
    decoder: Arc<dyn ImageDecoder>,
    extractor: Arc<dyn FrameExtractor>,
    hash_size: HashSize,
    anim_frame: u32,
}

impl std::fmt::Debug for FingerprintCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FingerprintCodec")
            .field("hash_size", &self.hash_size)
            .field("anim_frame", &self.anim_frame)
            .finish_non_exhaustive()
    }
}

impl FingerprintCodec {
    /// Codec using the built-in decoders.
    #[must_use]
    pub fn new(hash_size: HashSize) -> Self {
        Self::with_collaborators(
            hash_size,
            Arc::new(StdImageDecoder),
            Arc::new(MediaFrameExtractor),
        )
    }

    /// Codec with caller-supplied decoders.
    #[must_use]
    pub fn with_collaborators(
        hash_size: HashSize,
        decoder: Arc<dyn ImageDecoder>,
        extractor: Arc<dyn FrameExtractor>,
    ) -> Self {
        Self {
            decoder,
            extractor,
            hash_size,
            anim_frame: 0,
        }
    }

    /// Sample video and animated sources at this frame.
    #[must_use]
    pub fn with_anim_frame(mut self, frame: u32) -> Self {
        self.anim_frame = frame;
        self
    }

    /// Grid size of the fingerprints this codec produces.
    #[must_use]
    pub fn hash_size(&self) -> HashSize {
        self.hash_size
    }

    /// Frame index sampled from video sources.
    #[must_use]
    pub fn anim_frame(&self) -> u32 {
        self.anim_frame
    }

    /// Fingerprint the file at `path`.
    pub fn compute(&self, path: &Path) -> Result<Fingerprint, DecodeError> {
        let grid = match MediaKind::from_path(path) {
            Some(MediaKind::Video) => self.extractor.extract_frame(path, self.anim_frame)?,
            _ => self.decoder.decode(path)?,
        };
        Ok(dhash(&grid, self.hash_size))
    }
}
