// src/compare.rs

//! Line-and-coverage aware file comparison
//!
//! Two `(text, coverage)` pairs are diffed with an LCS-style edit distance
//! over their lines, then each line is classified by whether its coverage
//! changed under the active strategy. Long runs of completely identical
//! lines are folded into a single note.

use crate::settings::Settings;
use std::collections::VecDeque;

/// What counts as a coverage-equal line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareStrategy {
    /// Tri-state comparison: covered, missed or irrelevant.
    State,
    /// Exact hit-count equality.
    Hits,
    /// Only reductions in coverage count as change.
    Regress,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffLineType {
    /// Same text, same coverage under the strategy.
    Identical,
    /// Same text, different coverage under the strategy.
    Common,
    Added,
    Removed,
    /// Marker line, e.g. "<N> lines folded".
    Note,
}

/// One line of an assembled diff with its provenance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffLine {
    pub line_type: DiffLineType,
    pub text: String,
    pub old_line: Option<usize>,
    pub new_line: Option<usize>,
}

impl DiffLine {
    fn new(
        line_type: DiffLineType,
        text: String,
        old_line: Option<usize>,
        new_line: Option<usize>,
    ) -> Self {
        Self {
            line_type,
            text,
            old_line,
            new_line,
        }
    }

    fn note(text: String) -> Self {
        Self::new(DiffLineType::Note, text, None, None)
    }
}

/// Normalizes a hit count before comparison according to the strategy.
fn normalize_hits(hits: i64, strategy: CompareStrategy) -> i64 {
    match strategy {
        CompareStrategy::Hits => hits,
        CompareStrategy::State | CompareStrategy::Regress => hits.signum(),
    }
}

pub struct FileComparator {
    valid: bool,
    input_error: String,
    equal: bool,
    diff_seq: VecDeque<DiffLine>,
}

/// Diff assembly state shared by the backtracking loops.
struct DiffBuilder {
    seq: VecDeque<DiffLine>,
    identical_run: usize,
    strategy: CompareStrategy,
    min_fold_size: usize,
    context: usize,
}

impl DiffBuilder {
    /// Collapses the run of identical lines at the front of the sequence,
    /// keeping `context` lines on inner boundaries and none at file ends.
    fn fold_identical(&mut self, last: bool) {
        let start_context = if last { 0 } else { self.context };
        let end_context = if self.identical_run == self.seq.len() {
            0
        } else {
            self.context
        };
        let context = start_context + end_context;

        if self.identical_run >= context && self.identical_run - context > self.min_fold_size {
            let folded = self.identical_run - context;
            self.seq.drain(start_context..self.identical_run - end_context);
            self.seq
                .insert(start_context, DiffLine::note(format!("{folded} lines folded")));
        }
        self.identical_run = 0;
    }

    /// Added/removed lines of irrelevant code (or, for `Regress`, anything
    /// that is not a newly-uncovered line) extend the identical run instead
    /// of breaking it.
    fn account_edit(&mut self, hits: i64, added: bool) {
        if hits == -1 || (self.strategy == CompareStrategy::Regress && (!added || hits > 0)) {
            self.identical_run += 1;
        } else {
            self.fold_identical(false);
        }
    }

    /// Classifies a pair of textually equal lines.
    fn handle_same_lines(&mut self, text: &str, i: usize, j: usize, old_hits: i64, new_hits: i64) {
        let o = normalize_hits(old_hits, self.strategy);
        let n = normalize_hits(new_hits, self.strategy);

        if o == n || (self.strategy == CompareStrategy::Regress && (n < 0 || n > o)) {
            self.seq.push_front(DiffLine::new(
                DiffLineType::Identical,
                text.to_string(),
                Some(i),
                Some(j),
            ));
            self.identical_run += 1;
        } else {
            self.fold_identical(false);
            self.seq.push_front(DiffLine::new(
                DiffLineType::Common,
                text.to_string(),
                Some(i),
                Some(j),
            ));
        }
    }
}

impl FileComparator {
    pub fn new(
        old: &[String],
        old_cov: &[i64],
        new: &[String],
        new_cov: &[i64],
        strategy: CompareStrategy,
        settings: &Settings,
    ) -> Self {
        let mut input_error = String::new();
        if !coverage_matches(old.len(), old_cov.len()) {
            input_error += &format!(
                "Old state is incorrect ({} file lines vs. {} coverage lines)\n",
                old.len(),
                old_cov.len()
            );
        }
        if !coverage_matches(new.len(), new_cov.len()) {
            input_error += &format!(
                "New state is incorrect ({} file lines vs. {} coverage lines)\n",
                new.len(),
                new_cov.len()
            );
        }
        if !input_error.is_empty() {
            return Self {
                valid: false,
                input_error,
                equal: false,
                diff_seq: VecDeque::new(),
            };
        }

        // Narrow the portion that needs the edit-distance table by throwing
        // away matching leading and trailing lines.
        let mut ol = 0;
        let mut nl = 0;
        let mut ou = old.len();
        let mut nu = new.len();
        while ol < ou && nl < nu && old[ol] == new[nl] {
            ol += 1;
            nl += 1;
        }
        while ou > ol && nu > nl && old[ou - 1] == new[nu - 1] {
            ou -= 1;
            nu -= 1;
        }

        // Edit distance with insertions and deletions only.
        let rows = ou - ol + 1;
        let cols = nu - nl + 1;
        let mut d = vec![vec![0usize; cols]; rows];
        for (i, row) in d.iter_mut().enumerate() {
            for j in 0..cols {
                if i == 0 {
                    row[j] = j;
                } else if j == 0 {
                    row[j] = i;
                }
            }
        }
        for i in 1..rows {
            for j in 1..cols {
                d[i][j] = (d[i - 1][j] + 1).min(d[i][j - 1] + 1);
                if old[ol + i - 1] == new[nl + j - 1] {
                    d[i][j] = d[i][j].min(d[i - 1][j - 1]);
                }
            }
        }

        let mut builder = DiffBuilder {
            seq: VecDeque::new(),
            identical_run: 0,
            strategy,
            min_fold_size: settings.min_fold_size(),
            context: settings.fold_context(),
        };

        // The sequence is assembled back to front: tail, then the edited
        // middle via backtracking, then the head.

        {
            let mut k = old.len();
            let mut l = new.len();
            while k > ou {
                k -= 1;
                l -= 1;
                builder.handle_same_lines(&old[k], k, l, old_cov[k], new_cov[l]);
            }
        }

        let mut i = ou - ol;
        let mut j = nu - nl;
        while i != 0 || j != 0 {
            if i == 0 || (j != 0 && d[i][j] == d[i][j - 1] + 1) {
                // Prefer insertions over deletions on equal cost.
                j -= 1;
                builder.account_edit(new_cov[nl + j], true);
                builder.seq.push_front(DiffLine::new(
                    DiffLineType::Added,
                    new[nl + j].clone(),
                    None,
                    Some(nl + j),
                ));
            } else if j == 0 || d[i][j] == d[i - 1][j] + 1 {
                i -= 1;
                builder.account_edit(old_cov[ol + i], false);
                builder.seq.push_front(DiffLine::new(
                    DiffLineType::Removed,
                    old[ol + i].clone(),
                    Some(ol + i),
                    None,
                ));
            } else {
                i -= 1;
                j -= 1;
                builder.handle_same_lines(
                    &old[ol + i],
                    ol + i,
                    nl + j,
                    old_cov[ol + i],
                    new_cov[nl + j],
                );
            }
        }

        for i in (0..ol).rev() {
            builder.handle_same_lines(&old[i], i, i, old_cov[i], new_cov[i]);
        }

        let equal = builder.identical_run == builder.seq.len();
        builder.fold_identical(true);

        Self {
            valid: true,
            input_error,
            equal,
            diff_seq: builder.seq,
        }
    }

    pub fn is_valid_input(&self) -> bool {
        self.valid
    }

    pub fn input_error(&self) -> &str {
        &self.input_error
    }

    /// Whether every assembled line was `Identical` (before folding).
    pub fn are_equal(&self) -> bool {
        self.equal
    }

    pub fn diff_sequence(&self) -> &VecDeque<DiffLine> {
        &self.diff_seq
    }
}

/// Coverage must have one entry per line, plus an optional trailing one.
fn coverage_matches(lines: usize, cov_entries: usize) -> bool {
    lines <= cov_entries && lines + 1 >= cov_entries
}

/// Splits text into lines the way coverage counts them: a trailing newline
/// does not open another line, and empty text has no lines at all.
pub fn text_lines(text: &str) -> Vec<String> {
    let mut lines: Vec<String> = text.split('\n').map(str::to_string).collect();
    if lines.last().is_some_and(String::is_empty) {
        lines.pop();
    }
    lines
}
