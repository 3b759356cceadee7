//! Hamming-distance comparison of fingerprints.
//!
//! The scanner compares every pair of candidates, so this is the hot loop
//! of a scan. Two things keep it fast:
//!
//! * the bit counting primitive is the fastest [`BitCounter`] the CPU
//!   supports (see [`popcount`]), and
//! * threshold checks stop counting as soon as the running distance
//!   passes the threshold.
//!
//! Fingerprints of different lengths come from different hash sizes and
//! are never similar; their distance is [`MAX_DISTANCE`].

pub mod popcount;

pub use popcount::{BitCounter, CountOnes, Counter, HardwarePopcnt, NibbleTable};

/// Distance reported for fingerprints of different lengths.
pub const MAX_DISTANCE: u32 = u32::MAX;

/// Compares fingerprints by Hamming distance.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimilarityComparator<C = Counter> {
    counter: C,
}

impl SimilarityComparator<Counter> {
    /// Comparator using the fastest available strategy.
    #[must_use]
    pub fn new() -> Self {
        let counter = Counter::detect();
        log::debug!("Using {} bit counter", counter.name());
        Self { counter }
    }
}

impl<C: BitCounter> SimilarityComparator<C> {
    /// Comparator using a specific strategy.
    #[must_use]
    pub fn with_counter(counter: C) -> Self {
        Self { counter }
    }

    /// The bit counting strategy in use.
    #[must_use]
    pub fn counter(&self) -> &C {
        &self.counter
    }

    /// Full Hamming distance, or [`MAX_DISTANCE`] on a length mismatch.
    #[must_use]
    pub fn distance(&self, a: &[u8], b: &[u8]) -> u32 {
        if a.len() != b.len() {
            return MAX_DISTANCE;
        }
        self.counter.xor_count(a, b, u32::MAX)
    }

    /// Distance if it is at most `threshold`, otherwise `None`.
    ///
    /// Stops counting once the threshold is exceeded.
    #[must_use]
    pub fn within(&self, a: &[u8], b: &[u8], threshold: u32) -> Option<u32> {
        if a.len() != b.len() {
            return None;
        }
        let distance = self.counter.xor_count(a, b, threshold);
        (distance <= threshold).then_some(distance)
    }

    /// True when the fingerprints differ in at most `threshold` bits.
    ///
    /// Always false for fingerprints of different lengths.
    #[must_use]
    pub fn is_duplicate(&self, a: &[u8], b: &[u8], threshold: u32) -> bool {
        self.within(a, b, threshold).is_some()
    }
}
