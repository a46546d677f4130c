// src/printing.rs

//! Small value-formatting helpers shared by listings and file views

use chrono::{Local, TimeZone};

/// Format of build timestamps in tables and headers.
const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Horizontal separator between header blocks and file contents.
pub fn line_separator() -> String {
    "-".repeat(79)
}

/// Renders a unix timestamp in local time.
pub fn format_time(timestamp: i64) -> String {
    match Local.timestamp_opt(timestamp, 0).single() {
        Some(time) => time.format(TIME_FORMAT).to_string(),
        None => timestamp.to_string(),
    }
}

/// Renders a hit count for the coverage gutter: `x0` missed, `xN` covered,
/// blank when the line is not relevant. Right-aligned to `width`, followed
/// by a single space.
pub fn format_hits(hits: Option<i64>, width: usize) -> String {
    let value = match hits {
        Some(n) if n >= 0 => format!("x{n}"),
        _ => String::new(),
    };
    format!("{value:>width$} ")
}

/// Width of the hit-count column for a coverage vector.
pub fn hits_width(coverage: &[i64]) -> usize {
    const MIN_HITS_NUM_WIDTH: usize = 5;
    let max_hits = coverage.iter().copied().max().unwrap_or(0);
    MIN_HITS_NUM_WIDTH.max(count_width(max_hits) + 1)
}

/// Number of digits in a non-negative count.
fn count_width(mut n: i64) -> usize {
    let mut width = 1;
    while n >= 10 {
        n /= 10;
        width += 1;
    }
    width
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hits_column() {
        assert_eq!(format_hits(Some(0), 5), "   x0 ");
        assert_eq!(format_hits(Some(12), 5), "  x12 ");
        assert_eq!(format_hits(Some(-1), 5), "      ");
        assert_eq!(format_hits(None, 5), "      ");
    }

    #[test]
    fn test_hits_width_grows_with_counts() {
        assert_eq!(hits_width(&[]), 5);
        assert_eq!(hits_width(&[0, 3, -1]), 5);
        assert_eq!(hits_width(&[123456]), 7);
    }

    #[test]
    fn test_separator_length() {
        assert_eq!(line_separator().len(), 79);
    }
}
