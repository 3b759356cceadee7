//! Progress reporting utilities using indicatif.
//!
//! This module provides the [`Progress`] struct which implements [`ProgressCallback`]
//! to display progress bars in the terminal while a scan runs.

use std::sync::{Mutex, MutexGuard};

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};

/// Phase name for fingerprint lookup and computation.
pub const PHASE_HASHING: &str = "hashing";
/// Phase name for pairwise comparison.
pub const PHASE_COMPARING: &str = "comparing";

/// Progress callback for scan phases.
///
/// Implement this trait to receive progress updates from a
/// [`DuplicateScanner`](crate::duplicates::DuplicateScanner).
pub trait ProgressCallback: Send + Sync {
    /// Called when a phase starts.
    ///
    /// # Arguments
    ///
    /// * `phase` - [`PHASE_HASHING`] or [`PHASE_COMPARING`]
    /// * `total` - Total number of items to process
    fn on_phase_start(&self, phase: &str, total: usize);

    /// Called for each item processed.
    ///
    /// # Arguments
    ///
    /// * `current` - Current item number (1-based)
    /// * `key` - Cache key of the item being processed
    fn on_progress(&self, current: usize, key: &str);

    /// Called when a phase completes (or is cut short by cancellation).
    fn on_phase_end(&self, phase: &str);
}

/// Progress reporter using indicatif.
pub struct Progress {
    multi: MultiProgress,
    hashing: Mutex<Option<ProgressBar>>,
    comparing: Mutex<Option<ProgressBar>>,
    quiet: bool,
}

impl Progress {
    /// Create a new progress reporter.
    ///
    /// # Examples
    ///
    /// ```
    /// use imgsift::progress::Progress;
    ///
    /// let progress = Progress::new(true);
    /// ```
    #[must_use]
    pub fn new(quiet: bool) -> Self {
        let multi = if quiet {
            MultiProgress::with_draw_target(ProgressDrawTarget::hidden())
        } else {
            MultiProgress::new()
        };
        Self {
            multi,
            hashing: Mutex::new(None),
            comparing: Mutex::new(None),
            quiet,
        }
    }

    fn bar_style(colour: &str) -> ProgressStyle {
        let template = format!(
            "[{{elapsed_precise}}] [{{bar:40.{colour}/blue}}] {{pos}}/{{len}} ({{percent}}%) {{msg}} (ETA: {{eta}})"
        );
        ProgressStyle::with_template(&template)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█>-")
    }

    fn slot(&self, phase: &str) -> Option<MutexGuard<'_, Option<ProgressBar>>> {
        let slot = match phase {
            PHASE_HASHING => &self.hashing,
            PHASE_COMPARING => &self.comparing,
            _ => return None,
        };
        slot.lock().ok()
    }

    fn active(&self) -> Option<ProgressBar> {
        [&self.comparing, &self.hashing]
            .into_iter()
            .find_map(|slot| slot.lock().ok().and_then(|bar| bar.clone()))
    }
}

impl ProgressCallback for Progress {
    fn on_phase_start(&self, phase: &str, total: usize) {
        if self.quiet {
            return;
        }
        let (colour, message) = match phase {
            PHASE_HASHING => ("cyan", "Fingerprinting"),
            _ => ("green", "Comparing"),
        };
        let pb = self.multi.add(ProgressBar::new(total as u64));
        pb.set_style(Self::bar_style(colour));
        pb.set_message(message);
        if let Some(mut slot) = self.slot(phase) {
            *slot = Some(pb);
        }
    }

    fn on_progress(&self, current: usize, key: &str) {
        if self.quiet {
            return;
        }
        if let Some(pb) = self.active() {
            pb.set_position(current as u64);
            pb.set_message(truncate_key(key, 30));
        }
    }

    fn on_phase_end(&self, phase: &str) {
        if self.quiet {
            return;
        }
        let message = match phase {
            PHASE_HASHING => "Fingerprinting complete",
            _ => "Comparison complete",
        };
        if let Some(pb) = self.slot(phase).and_then(|mut slot| slot.take()) {
            pb.finish_with_message(message);
        }
    }
}

/// Shorten a key for display, keeping the file name.
fn truncate_key(key: &str, max_len: usize) -> String {
    if key.chars().count() <= max_len {
        return key.to_string();
    }
    let file_name = key.rsplit('/').next().unwrap_or(key);
    let chars: Vec<char> = file_name.chars().collect();
    if chars.len() + 4 > max_len {
        let tail: String = chars[chars.len().saturating_sub(max_len - 3)..].iter().collect();
        return format!("...{tail}");
    }
    format!(".../{file_name}")
}
