// src/table.rs

//! Column-aligned table assembly for listings
//!
//! Headers prefixed with `-` mark left-aligned columns (paths, names); all
//! other columns are right-aligned, which suits the numeric data.

use std::io::{self, Write};

pub struct TablePrinter {
    headers: Vec<String>,
    left_aligned: Vec<bool>,
    hide_headers: bool,
    rows: Vec<Vec<String>>,
}

impl TablePrinter {
    pub fn new(headings: &[&str], hide_headers: bool) -> Self {
        let mut headers = Vec::with_capacity(headings.len());
        let mut left_aligned = Vec::with_capacity(headings.len());
        for heading in headings {
            match heading.strip_prefix('-') {
                Some(name) => {
                    headers.push(name.to_string());
                    left_aligned.push(true);
                }
                None => {
                    headers.push(heading.to_string());
                    left_aligned.push(false);
                }
            }
        }
        Self {
            headers,
            left_aligned,
            hide_headers,
            rows: Vec::new(),
        }
    }

    /// Adds a row; it must have as many cells as there are headers.
    pub fn append(&mut self, row: Vec<String>) {
        assert_eq!(row.len(), self.headers.len(), "row width mismatch");
        self.rows.push(row);
    }

    pub fn print<W: Write>(&self, out: &mut W) -> io::Result<()> {
        let mut widths: Vec<usize> = if self.hide_headers {
            vec![0; self.headers.len()]
        } else {
            self.headers.iter().map(String::len).collect()
        };
        for row in &self.rows {
            for (width, cell) in widths.iter_mut().zip(row) {
                *width = (*width).max(cell.len());
            }
        }

        if !self.hide_headers {
            self.print_row(out, &self.headers, &widths)?;
        }
        for row in &self.rows {
            self.print_row(out, row, &widths)?;
        }
        Ok(())
    }

    fn print_row<W: Write>(&self, out: &mut W, row: &[String], widths: &[usize]) -> io::Result<()> {
        let mut line = String::new();
        for (i, cell) in row.iter().enumerate() {
            if i > 0 {
                line.push_str("  ");
            }
            if self.left_aligned[i] {
                line.push_str(&format!("{:<width$}", cell, width = widths[i]));
            } else {
                line.push_str(&format!("{:>width$}", cell, width = widths[i]));
            }
        }
        writeln!(out, "{}", line.trim_end())
    }
}
