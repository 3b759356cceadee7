//! Population-count strategies for XOR distance.
//!
//! Every strategy computes the same thing: the number of set bits in
//! `a XOR b`, accumulated left to right and abandoned once it exceeds a
//! limit. They differ only in speed. [`Counter::detect`] picks the fastest
//! one the running CPU supports.

use std::fmt;

/// Counts differing bits between two equal-length byte slices.
pub trait BitCounter: Send + Sync {
    /// Short name used in logs and benchmarks.
    fn name(&self) -> &'static str;

    /// Number of set bits in `a XOR b`.
    ///
    /// Counting stops as soon as the running total exceeds `limit`; the
    /// returned value is then some number greater than `limit`, not the
    /// full distance. When the true distance is `<= limit` it is exact.
    /// Callers guarantee `a.len() == b.len()`.
    fn xor_count(&self, a: &[u8], b: &[u8], limit: u32) -> u32;
}

/// Set-bit counts for every nibble value.
const NIBBLE_BITS: [u8; 16] = [0, 1, 1, 2, 1, 2, 2, 3, 1, 2, 2, 3, 2, 3, 3, 4];

/// Portable fallback: two lookups into a 16-entry table per byte.
#[derive(Debug, Default, Clone, Copy)]
pub struct NibbleTable;

impl BitCounter for NibbleTable {
    fn name(&self) -> &'static str {
        "nibble-table"
    }

    fn xor_count(&self, a: &[u8], b: &[u8], limit: u32) -> u32 {
        let mut total = 0u32;
        for (x, y) in a.iter().zip(b) {
            let diff = x ^ y;
            total += u32::from(NIBBLE_BITS[usize::from(diff & 0x0f)]);
            total += u32::from(NIBBLE_BITS[usize::from(diff >> 4)]);
            if total > limit {
                break;
            }
        }
        total
    }
}

/// `u8::count_ones` per byte; the compiler chooses the instruction.
#[derive(Debug, Default, Clone, Copy)]
pub struct CountOnes;

impl BitCounter for CountOnes {
    fn name(&self) -> &'static str {
        "count-ones"
    }

    fn xor_count(&self, a: &[u8], b: &[u8], limit: u32) -> u32 {
        let mut total = 0u32;
        for (x, y) in a.iter().zip(b) {
            total += (x ^ y).count_ones();
            if total > limit {
                break;
            }
        }
        total
    }
}

/// Hardware population count over 64-bit words.
///
/// Construct through [`HardwarePopcnt::detect`], which only succeeds when
/// the CPU has a native popcount instruction.
#[derive(Debug, Clone, Copy)]
pub struct HardwarePopcnt {
    _private: (),
}

impl HardwarePopcnt {
    /// Returns the strategy if the running CPU supports it.
    #[must_use]
    pub fn detect() -> Option<Self> {
        #[cfg(target_arch = "x86_64")]
        {
            is_x86_feature_detected!("popcnt").then_some(Self { _private: () })
        }
        // AArch64 always has CNT; count_ones on u64 lowers to it.
        #[cfg(target_arch = "aarch64")]
        {
            Some(Self { _private: () })
        }
        #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
        {
            None
        }
    }
}

impl BitCounter for HardwarePopcnt {
    fn name(&self) -> &'static str {
        "hardware-popcnt"
    }

    fn xor_count(&self, a: &[u8], b: &[u8], limit: u32) -> u32 {
        #[cfg(target_arch = "x86_64")]
        {
            // SAFETY: a HardwarePopcnt only exists after `detect` confirmed
            // the popcnt feature on this CPU.
            unsafe { xor_count_popcnt(a, b, limit) }
        }
        #[cfg(not(target_arch = "x86_64"))]
        {
            xor_count_words(a, b, limit)
        }
    }
}

#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "popcnt")]
unsafe fn xor_count_popcnt(a: &[u8], b: &[u8], limit: u32) -> u32 {
    xor_count_words(a, b, limit)
}

/// Word-at-a-time XOR count with a byte tail.
#[inline(always)]
fn xor_count_words(a: &[u8], b: &[u8], limit: u32) -> u32 {
    let mut total = 0u32;
    let mut wa = a.chunks_exact(8);
    let mut wb = b.chunks_exact(8);
    for (x, y) in wa.by_ref().zip(wb.by_ref()) {
        let x = u64::from_ne_bytes([x[0], x[1], x[2], x[3], x[4], x[5], x[6], x[7]]);
        let y = u64::from_ne_bytes([y[0], y[1], y[2], y[3], y[4], y[5], y[6], y[7]]);
        total += (x ^ y).count_ones();
        if total > limit {
            return total;
        }
    }
    for (x, y) in wa.remainder().iter().zip(wb.remainder()) {
        total += (x ^ y).count_ones();
        if total > limit {
            break;
        }
    }
    total
}

/// All strategies behind one enum, so the hot loop stays monomorphic.
#[derive(Clone, Copy)]
pub enum Counter {
    /// [`NibbleTable`].
    NibbleTable(NibbleTable),
    /// [`CountOnes`].
    CountOnes(CountOnes),
    /// [`HardwarePopcnt`].
    Hardware(HardwarePopcnt),
}

impl Counter {
    /// Fastest strategy available on this CPU.
    #[must_use]
    pub fn detect() -> Self {
        match HardwarePopcnt::detect() {
            Some(hw) => Self::Hardware(hw),
            None => Self::CountOnes(CountOnes),
        }
    }

    /// Every strategy usable on this CPU, portable ones first.
    #[must_use]
    pub fn available() -> Vec<Self> {
        let mut all = vec![Self::NibbleTable(NibbleTable), Self::CountOnes(CountOnes)];
        if let Some(hw) = HardwarePopcnt::detect() {
            all.push(Self::Hardware(hw));
        }
        all
    }
}

impl Default for Counter {
    fn default() -> Self {
        Self::detect()
    }
}

impl fmt::Debug for Counter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Counter({})", self.name())
    }
}

impl BitCounter for Counter {
    fn name(&self) -> &'static str {
        match self {
            Self::NibbleTable(c) => c.name(),
            Self::CountOnes(c) => c.name(),
            Self::Hardware(c) => c.name(),
        }
    }

    #[inline]
    fn xor_count(&self, a: &[u8], b: &[u8], limit: u32) -> u32 {
        match self {
            Self::NibbleTable(c) => c.xor_count(a, b, limit),
            Self::CountOnes(c) => c.xor_count(a, b, limit),
            Self::Hardware(c) => c.xor_count(a, b, limit),
        }
    }
}
