// src/settings.rs

//! Per-repository configuration (`uncov.ini`)
//!
//! The file sits next to the database in the `.git` directory and holds
//! plain `key = value` pairs. Missing or unreadable files and malformed
//! values are silently ignored; out-of-range values are clamped.

use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct Settings {
    low_bound: f32,
    hi_bound: f32,
    tab_size: usize,
    min_fold_size: usize,
    fold_context: usize,
    diff_show_lineno: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            low_bound: 70.0,
            hi_bound: 90.0,
            tab_size: 4,
            min_fold_size: 3,
            fold_context: 1,
            diff_show_lineno: false,
        }
    }
}

impl Settings {
    /// Merges values from an ini file into the current settings.
    pub fn load_from_file(&mut self, path: &Path) {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(_) => return,
        };
        debug!("Loading configuration from {}", path.display());

        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let (key, value) = (key.trim(), value.trim());

            match key {
                "low-bound" => {
                    if let Ok(v) = value.parse() {
                        self.low_bound = v;
                    }
                }
                "hi-bound" => {
                    if let Ok(v) = value.parse() {
                        self.hi_bound = v;
                    }
                }
                "tab-size" => {
                    if let Ok(v) = value.parse::<i64>() {
                        self.tab_size = v.clamp(1, 25) as usize;
                    }
                }
                "min-fold-size" => {
                    if let Ok(v) = value.parse::<i64>() {
                        self.min_fold_size = v.clamp(1, 100) as usize;
                    }
                }
                "fold-context" => {
                    if let Ok(v) = value.parse::<i64>() {
                        self.fold_context = v.clamp(0, 100) as usize;
                    }
                }
                "diff-show-lineno" => {
                    if let Ok(v) = parse_bool(value) {
                        self.diff_show_lineno = v;
                    }
                }
                _ => {}
            }
        }

        self.clamp();
    }

    fn clamp(&mut self) {
        self.low_bound = self.low_bound.clamp(0.0, 100.0);
        self.hi_bound = self.hi_bound.clamp(0.0, 100.0);
        if self.hi_bound < self.low_bound {
            std::mem::swap(&mut self.low_bound, &mut self.hi_bound);
        }
    }

    pub fn low_bound(&self) -> f32 {
        self.low_bound
    }

    pub fn hi_bound(&self) -> f32 {
        self.hi_bound
    }

    pub fn tab_size(&self) -> usize {
        self.tab_size
    }

    pub fn min_fold_size(&self) -> usize {
        self.min_fold_size
    }

    pub fn fold_context(&self) -> usize {
        self.fold_context
    }

    pub fn diff_show_lineno(&self) -> bool {
        self.diff_show_lineno
    }
}

fn parse_bool(value: &str) -> Result<bool, ()> {
    match value {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => Err(()),
    }
}
