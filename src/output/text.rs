//! Human-readable output.
//!
//! ```text
//! cats/a.png <-> cats/b.png (distance 3)
//! failed: cats/c.png: file not found
//! 3 candidates, 2 fingerprinted (2 cached), 1 failed, 1 duplicate pair
//! ```

use std::io::Write;

use yansi::{Condition, Paint};

use super::OutputError;
use crate::duplicates::ScanReport;

/// Text renderer for a finished scan.
#[derive(Debug)]
pub struct TextOutput<'a> {
    report: &'a ScanReport,
    color: Condition,
}

impl<'a> TextOutput<'a> {
    /// Render `report`, coloured when `color` is set.
    #[must_use]
    pub fn new(report: &'a ScanReport, color: bool) -> Self {
        Self {
            report,
            color: if color { Condition::ALWAYS } else { Condition::NEVER },
        }
    }

    /// Write pairs, failures and a summary line.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<(), OutputError> {
        for pair in &self.report.pairs {
            writeln!(
                writer,
                "{} {} {} {}",
                pair.first.as_str().bold().whenever(self.color),
                "<->".dim().whenever(self.color),
                pair.second.as_str().bold().whenever(self.color),
                format!("(distance {})", pair.distance).cyan().whenever(self.color),
            )?;
        }
        for failure in &self.report.failures {
            writeln!(
                writer,
                "{} {}: {}",
                "failed:".yellow().whenever(self.color),
                failure.key,
                failure.error
            )?;
        }

        let stats = &self.report.stats;
        let pairs = self.report.pairs.len();
        writeln!(
            writer,
            "{} candidates, {} fingerprinted ({} cached), {} failed, {}",
            stats.candidates,
            stats.hashed,
            stats.cache_hits,
            stats.failed,
            format!("{pairs} duplicate pair{}", if pairs == 1 { "" } else { "s" })
                .green()
                .bold()
                .whenever(self.color),
        )?;
        Ok(())
    }
}
