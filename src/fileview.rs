// src/fileview.rs

//! Plain-text rendering of files and diffs with a coverage gutter
//!
//! Each source line is prefixed with its line number and hit count. In
//! missed-only mode, runs of more than four lines without missed coverage
//! collapse into a fold note, keeping one context line on inner boundaries.

use crate::compare::{DiffLine, DiffLineType, FileComparator};
use crate::error::Result;
use crate::printing::{format_hits, hits_width};
use crate::settings::Settings;
use std::io::Write;

const MIN_LINE_NO_WIDTH: usize = 5;

pub struct FilePrinter {
    tab_size: usize,
    show_lineno_in_diff: bool,
}

impl FilePrinter {
    pub fn new(settings: &Settings) -> Self {
        Self {
            tab_size: settings.tab_size(),
            show_lineno_in_diff: settings.diff_show_lineno(),
        }
    }

    fn expand_tabs(&self, line: &str) -> String {
        if !line.contains('\t') {
            return line.to_string();
        }
        line.replace('\t', &" ".repeat(self.tab_size))
    }

    /// Renders a file with its coverage gutter.
    ///
    /// With `leave_missed_only`, lines that aren't missed fold away. One
    /// missing source line is tolerated (the coverage vector may carry a
    /// trailing sentinel); anything worse gets an error trailer.
    pub fn print<W: Write>(
        &self,
        out: &mut W,
        contents: &str,
        coverage: &[i64],
        leave_missed_only: bool,
    ) -> Result<()> {
        let num_lines = coverage.len();
        let line_no_width = MIN_LINE_NO_WIDTH.max(num_lines.to_string().len());
        let hits_col_width = hits_width(coverage);

        // Line indexes to print; negative values mean "this many folded".
        let mut lines: Vec<i64> = Vec::with_capacity(num_lines);
        let mut uninteresting = 0usize;

        let fold_uninteresting = |lines: &mut Vec<i64>, uninteresting: &mut usize, last: bool| {
            if *uninteresting > 4 {
                let start_context = if *uninteresting == lines.len() { 0 } else { 1 };
                let end_context = if last { 0 } else { 1 };
                let context = start_context + end_context;

                let from = lines.len() - (*uninteresting - start_context);
                let to = lines.len() - end_context;
                lines.splice(from..to, [-((*uninteresting - context) as i64)]);
            }
            *uninteresting = 0;
        };

        for i in 0..num_lines {
            if leave_missed_only {
                if coverage[i] == 0 {
                    fold_uninteresting(&mut lines, &mut uninteresting, false);
                } else {
                    uninteresting += 1;
                }
            }
            lines.push(i as i64);
        }
        fold_uninteresting(&mut lines, &mut uninteresting, true);

        // A file ending with a newline yields a spurious empty tail.
        let mut source: Vec<&str> = contents.split('\n').collect();
        if source.last() == Some(&"") {
            source.pop();
        }

        let mut line_no = 0usize;
        let mut extra_lines = 0usize;

        for index in lines {
            if index < 0 {
                writeln!(out, "{} lines folded", -index)?;
                line_no += (-index) as usize;
                continue;
            }

            let text = match source.get(line_no) {
                Some(text) => self.expand_tabs(text),
                None => {
                    extra_lines += 1;
                    "<<< EOF >>>".to_string()
                }
            };

            writeln!(
                out,
                "{:>width$} {}: {}",
                line_no + 1,
                format_hits(coverage.get(line_no).copied(), hits_col_width),
                text,
                width = line_no_width,
            )?;
            line_no += 1;
        }

        // Print extra file lines (with unknown coverage).
        while let Some(text) = source.get(line_no) {
            writeln!(
                out,
                "{:>width$} {}: {}",
                line_no + 1,
                format_hits(None, hits_col_width),
                self.expand_tabs(text),
                width = line_no_width,
            )?;
            line_no += 1;
        }

        if extra_lines > 1 {
            writeln!(out, "ERROR: too few lines in the file.")?;
        } else if line_no > coverage.len() {
            writeln!(out, "ERROR: too many lines in the file.")?;
        }
        Ok(())
    }

    /// Renders an assembled diff with old and new coverage gutters.
    pub fn print_diff<W: Write>(
        &self,
        out: &mut W,
        comparator: &FileComparator,
        old_cov: &[i64],
        new_cov: &[i64],
    ) -> Result<()> {
        let old_width = hits_width(old_cov);
        let new_width = hits_width(new_cov);
        let lineno_width = old_cov.len().max(new_cov.len()).to_string().len().max(4);

        for line in comparator.diff_sequence() {
            if line.line_type == DiffLineType::Note {
                writeln!(out, "{}", line.text)?;
                continue;
            }

            let (marker, old_hits, new_hits) = match line.line_type {
                DiffLineType::Added => ('+', None, hits_at(new_cov, line.new_line)),
                DiffLineType::Removed => ('-', hits_at(old_cov, line.old_line), None),
                _ => (
                    ' ',
                    hits_at(old_cov, line.old_line),
                    hits_at(new_cov, line.new_line),
                ),
            };

            if self.show_lineno_in_diff {
                writeln!(
                    out,
                    "{:>w$} {:>w$} {}:{}:{}{}",
                    lineno_text(line, true),
                    lineno_text(line, false),
                    format_hits(old_hits, old_width),
                    format_hits(new_hits, new_width),
                    marker,
                    self.expand_tabs(&line.text),
                    w = lineno_width,
                )?;
            } else {
                writeln!(
                    out,
                    "{}:{}:{}{}",
                    format_hits(old_hits, old_width),
                    format_hits(new_hits, new_width),
                    marker,
                    self.expand_tabs(&line.text),
                )?;
            }
        }
        Ok(())
    }
}

fn hits_at(coverage: &[i64], line: Option<usize>) -> Option<i64> {
    line.and_then(|index| coverage.get(index).copied())
}

fn lineno_text(line: &DiffLine, old: bool) -> String {
    let number = if old { line.old_line } else { line.new_line };
    match number {
        Some(n) => (n + 1).to_string(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compare::CompareStrategy;

    fn printer() -> FilePrinter {
        FilePrinter::new(&Settings::default())
    }

    fn render_file(contents: &str, coverage: &[i64], missed_only: bool) -> String {
        let mut out = Vec::new();
        printer()
            .print(&mut out, contents, coverage, missed_only)
            .unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_gutter_layout() {
        let output = render_file("int x;\nx = 1;\n", &[-1, 5], false);
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "    1       : int x;");
        assert_eq!(lines[1], "    2    x5 : x = 1;");
    }

    #[test]
    fn test_missed_only_folds_uninteresting_lines() {
        let contents = "a\nb\nc\nd\ne\nf\ng\n";
        let coverage = &[1, 1, 1, 1, 1, 1, 0];

        let output = render_file(contents, coverage, true);
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "5 lines folded");
        assert!(lines[1].contains("f"));
        assert!(lines[2].contains("x0"));
    }

    #[test]
    fn test_trailing_sentinel_is_tolerated() {
        let output = render_file("one\n", &[1, -1], false);
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].contains("<<< EOF >>>"));
        assert!(!output.contains("ERROR"));
    }

    #[test]
    fn test_too_few_lines_is_reported() {
        let output = render_file("one\n", &[1, 1, 1], false);
        assert!(output.contains("ERROR: too few lines in the file."));
    }

    #[test]
    fn test_too_many_lines_is_reported() {
        let output = render_file("one\ntwo\nthree\n", &[1], false);
        assert!(output.contains("ERROR: too many lines in the file."));
    }

    #[test]
    fn test_diff_rendering() {
        let old_lines = vec!["a".to_string()];
        let new_lines = vec!["a".to_string()];
        let comparator = FileComparator::new(
            &old_lines,
            &[1],
            &new_lines,
            &[0],
            CompareStrategy::Regress,
            &Settings::default(),
        );

        let mut out = Vec::new();
        printer()
            .print_diff(&mut out, &comparator, &[1], &[0])
            .unwrap();
        let output = String::from_utf8(out).unwrap();
        assert_eq!(output, "   x1 :   x0 : a\n");
    }
}
