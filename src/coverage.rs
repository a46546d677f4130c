// src/coverage.rs

//! Aggregated coverage figures and their textual forms

use crate::history::{Build, File};

/// Covered/missed line counters of a file, directory or whole build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CovInfo {
    covered: i64,
    missed: i64,
}

impl CovInfo {
    pub fn new(covered: i64, missed: i64) -> Self {
        Self { covered, missed }
    }

    pub fn add(&mut self, other: CovInfo) {
        self.covered += other.covered;
        self.missed += other.missed;
    }

    pub fn covered(&self) -> i64 {
        self.covered
    }

    pub fn missed(&self) -> i64 {
        self.missed
    }

    pub fn relevant(&self) -> i64 {
        self.covered + self.missed
    }

    /// Coverage percentage; 100 when nothing is relevant, so that deltas of
    /// empty inputs stay zero.
    pub fn rate(&self) -> f32 {
        if self.relevant() == 0 {
            return 100.0;
        }
        (100.0 * self.covered as f32) / self.relevant() as f32
    }

    /// `NN.NN%` form of [`CovInfo::rate`].
    pub fn format_rate(&self) -> String {
        format!("{:.2}%", self.rate())
    }

    /// `covered<sep>relevant` form.
    pub fn format_lines(&self, separator: &str) -> String {
        format!("{}{}{}", self.covered, separator, self.relevant())
    }
}

impl From<&File> for CovInfo {
    fn from(file: &File) -> Self {
        CovInfo::new(file.covered_count(), file.missed_count())
    }
}

impl From<&Build<'_>> for CovInfo {
    fn from(build: &Build<'_>) -> Self {
        CovInfo::new(build.covered_count(), build.missed_count())
    }
}

/// Difference between two [`CovInfo`] values.
#[derive(Debug, Clone, Copy)]
pub struct CovChange {
    rate_change: f32,
    covered_change: i64,
    missed_change: i64,
    relevant_change: i64,
}

impl CovChange {
    pub fn new(old: CovInfo, new: CovInfo) -> Self {
        Self {
            rate_change: new.rate() - old.rate(),
            covered_change: new.covered - old.covered,
            missed_change: new.missed - old.missed,
            relevant_change: new.relevant() - old.relevant(),
        }
    }

    /// Whether covered or missed counts moved at all.
    pub fn is_changed(&self) -> bool {
        self.covered_change != 0 || self.missed_change != 0
    }

    /// `+N.NNNN%` / `-N.NNNN%` / `0.0000%` form of the rate delta.
    pub fn format_rate(&self) -> String {
        if self.rate_change > 0.0 {
            format!("+{:.4}%", self.rate_change)
        } else {
            format!("{:.4}%", self.rate_change)
        }
    }

    /// `covered<sep>missed<sep>relevant` deltas, each with an explicit sign
    /// for increases. `width` right-pads the missed and relevant fields.
    pub fn format_lines(&self, separator: &str, width: usize) -> String {
        format!(
            "{}{}{:>width$}{}{:>width$}",
            signed(self.covered_change),
            separator,
            signed(self.missed_change),
            separator,
            signed(self.relevant_change),
        )
    }
}

/// Plus-signed decimal for positive values, plain otherwise.
fn signed(n: i64) -> String {
    if n > 0 {
        format!("+{n}")
    } else {
        n.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_of_empty_input_is_full() {
        assert_eq!(CovInfo::default().format_rate(), "100.00%");
    }

    #[test]
    fn test_rate_formatting() {
        assert_eq!(CovInfo::new(2, 2).format_rate(), "50.00%");
        assert_eq!(CovInfo::new(2, 0).format_rate(), "100.00%");
        assert_eq!(CovInfo::new(1, 2).format_lines("/"), "1/3");
    }

    #[test]
    fn test_change_formatting() {
        let change = CovChange::new(CovInfo::new(2, 2), CovInfo::new(2, 0));
        assert_eq!(change.format_rate(), "+50.0000%");
        assert_eq!(change.format_lines(" / ", 4), "0 /   -2 /   -2");

        let none = CovChange::new(CovInfo::new(2, 2), CovInfo::new(2, 2));
        assert_eq!(none.format_rate(), "0.0000%");
        assert!(!none.is_changed());
    }

    #[test]
    fn test_change_detection_ignores_rate() {
        // Covered and missed both grow: the rate may stay put, the counts
        // still count as a change.
        let change = CovChange::new(CovInfo::new(1, 1), CovInfo::new(2, 2));
        assert!(change.is_changed());
    }

    #[test]
    fn test_accumulation() {
        let mut total = CovInfo::default();
        total.add(CovInfo::new(1, 2));
        total.add(CovInfo::new(3, 4));
        assert_eq!(total, CovInfo::new(4, 6));
    }
}
