//! Pure domain logic for todos.
//!
//! This crate implements the comment-level diff between two reports and the
//! statistics aggregation over a report. Everything here is side-effect free:
//! inputs are borrowed immutable reports and every result is a new value.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use todos_types::{Comment, DiffStatus, PatternStatistics, Report, ReportStatistics, TrendPoint};

// ============================================================================
// Report Extension
// ============================================================================

/// Diff and statistics operations on [`Report`].
pub trait ReportExt {
    /// Classify every comment against `previous`.
    ///
    /// Returns the receiver unchanged when there is no previous report.
    fn diff(&self, previous: Option<&Report>) -> Report;

    /// Compute statistics of this report.
    fn statistics(&self, source_files: BTreeSet<PathBuf>) -> ReportStatistics;
}

impl ReportExt for Report {
    fn diff(&self, previous: Option<&Report>) -> Report {
        diff_reports(self, previous)
    }

    fn statistics(&self, source_files: BTreeSet<PathBuf>) -> ReportStatistics {
        compute_statistics(self, source_files)
    }
}

// ============================================================================
// Diff
// ============================================================================

/// Compare `current` with `previous` and tag every comment with a status.
///
/// Matching runs in two passes over the current comments, each consuming the
/// first still-unmatched previous comment it finds:
/// 1. exact: same line, file and source code
/// 2. fuzzy: same file and source code, any line
///
/// Current comments matched by either pass are unchanged, the rest are new.
/// Previous comments never matched are solved. The pattern takes no part in
/// matching. The output is stable-sorted by [`DiffStatus::rank`].
pub fn diff_reports(current: &Report, previous: Option<&Report>) -> Report {
    let Some(previous) = previous else {
        return current.clone();
    };

    let current_comments = current.comments();
    let previous_comments = previous.comments();

    let mut current_done = vec![false; current_comments.len()];
    let mut previous_done = vec![false; previous_comments.len()];
    let mut emitted: Vec<Comment> = Vec::with_capacity(current_comments.len() + previous_comments.len());

    // Exact pass
    for (ci, comment) in current_comments.iter().enumerate() {
        if let Some(pi) = find_unmatched(previous_comments, &previous_done, |p| {
            p.line == comment.line && same_text(p, comment)
        }) {
            previous_done[pi] = true;
            current_done[ci] = true;
            emitted.push(comment.with_status(DiffStatus::Unchanged));
        }
    }

    // Fuzzy pass, tolerating line drift
    for (ci, comment) in current_comments.iter().enumerate() {
        if current_done[ci] {
            continue;
        }
        match find_unmatched(previous_comments, &previous_done, |p| same_text(p, comment)) {
            Some(pi) => {
                previous_done[pi] = true;
                emitted.push(comment.with_status(DiffStatus::Unchanged));
            }
            None => emitted.push(comment.with_status(DiffStatus::New)),
        }
    }

    for (pi, comment) in previous_comments.iter().enumerate() {
        if !previous_done[pi] {
            emitted.push(comment.with_status(DiffStatus::Solved));
        }
    }

    sort_by_status(&mut emitted);

    Report::new(emitted, current.version().map(str::to_string))
}

fn same_text(a: &Comment, b: &Comment) -> bool {
    a.file == b.file && a.source_code == b.source_code
}

fn find_unmatched<F>(comments: &[Comment], done: &[bool], predicate: F) -> Option<usize>
where
    F: Fn(&Comment) -> bool,
{
    comments
        .iter()
        .enumerate()
        .find(|(i, c)| !done[*i] && predicate(*c))
        .map(|(i, _)| i)
}

/// Stable sort of diffed comments: new, then solved, then unchanged.
///
/// Comments without a status sort last.
pub fn sort_by_status(comments: &mut [Comment]) {
    comments.sort_by_key(|c| c.diff_status.map(|s| s.rank()).unwrap_or(u8::MAX));
}

// ============================================================================
// Statistics
// ============================================================================

/// Compute statistics of `report` in a single pass.
pub fn compute_statistics(report: &Report, source_files: BTreeSet<PathBuf>) -> ReportStatistics {
    let mut all_files: BTreeSet<&str> = BTreeSet::new();
    let mut per_pattern: BTreeMap<&str, (usize, BTreeSet<&str>)> = BTreeMap::new();

    for comment in report.comments() {
        all_files.insert(&comment.file);
        let (occurrences, files) = per_pattern.entry(&comment.pattern).or_default();
        *occurrences += 1;
        files.insert(&comment.file);
    }

    let patterns = per_pattern
        .into_iter()
        .map(|(pattern, (occurrences, files))| {
            PatternStatistics::new(pattern, occurrences, files.len())
        });

    ReportStatistics::new(patterns, all_files.len(), source_files)
}

/// Difference between a current and a previous value of one counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delta {
    pub current: usize,
    /// `None` when there is no previous statistics to compare against.
    pub previous: Option<usize>,
}

impl Delta {
    pub fn new(current: usize, previous: Option<usize>) -> Self {
        Self { current, previous }
    }

    /// Signed change, or `None` without a previous value.
    pub fn change(&self) -> Option<i64> {
        self.previous
            .map(|previous| self.current as i64 - previous as i64)
    }
}

/// Per-pattern deltas of one pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternDelta {
    pub pattern: String,
    pub occurrences: Delta,
    pub files: Delta,
}

/// Comparison of current statistics with optional previous statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatisticsDelta {
    pub comments: Delta,
    pub files: Delta,
    /// One entry per pattern seen in either side, sorted by name.
    pub patterns: Vec<PatternDelta>,
}

/// Compare two statistics snapshots.
///
/// Patterns present on only one side are compared against a zero-valued
/// placeholder from the other side.
pub fn statistics_delta(
    current: &ReportStatistics,
    previous: Option<&ReportStatistics>,
) -> StatisticsDelta {
    let names: BTreeSet<&str> = current
        .patterns()
        .keys()
        .chain(previous.into_iter().flat_map(|p| p.patterns().keys()))
        .map(String::as_str)
        .collect();

    let patterns = names
        .into_iter()
        .map(|name| {
            let now = current.pattern_statistics(name);
            let before = previous.map(|p| p.pattern_statistics(name));
            PatternDelta {
                pattern: name.to_string(),
                occurrences: Delta::new(
                    now.num_occurrences(),
                    before.as_ref().map(|b| b.num_occurrences()),
                ),
                files: Delta::new(now.num_files(), before.as_ref().map(|b| b.num_files())),
            }
        })
        .collect();

    StatisticsDelta {
        comments: Delta::new(
            current.total_comments(),
            previous.map(|p| p.total_comments()),
        ),
        files: Delta::new(current.total_files(), previous.map(|p| p.total_files())),
        patterns,
    }
}

// ============================================================================
// Trend
// ============================================================================

/// One trend data point: comment counts per pattern for `build`.
pub fn trend_point(build: u64, report: &Report) -> TrendPoint {
    TrendPoint {
        build,
        counts: report.pattern_to_count_mapping(),
    }
}

/// All pattern names appearing in any point, sorted.
pub fn trend_patterns(points: &[TrendPoint]) -> Vec<String> {
    let names: BTreeSet<&String> = points.iter().flat_map(|p| p.counts.keys()).collect();
    names.into_iter().cloned().collect()
}

// ============================================================================
// Tests
// ============================================================================
