//! Core types and DTOs for todos.
//!
//! This crate defines the comment and report model shared by every other
//! crate: the comments found by an upstream scanner, the report that groups
//! them, the statistics derived from a report, and the JSON documents the
//! CLI writes.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

// ============================================================================
// Schema Constants
// ============================================================================

/// Schema identifier for the publish output document.
pub const SCHEMA_ID: &str = "todos.report.v1";

/// Schema identifier for the trend dataset document.
pub const TREND_SCHEMA_ID: &str = "todos.trend.v1";

/// Line number used by placeholder comments whose position is unknown.
pub const UNKNOWN_LINE: i32 = -1;

// ============================================================================
// Fingerprint
// ============================================================================

/// Compute a SHA-256 fingerprint from pipe-delimited parts.
///
/// Joins all parts with `|`, hashes with SHA-256, and returns lowercase hex.
pub fn compute_fingerprint(parts: &[&str]) -> String {
    let input = parts.join("|");
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    let result = hasher.finalize();
    format!("{:x}", result)
}

// ============================================================================
// Diff Status
// ============================================================================

/// Classification of a comment relative to the previous report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffStatus {
    /// Present only in the current report.
    New,
    /// Present only in the previous report.
    Solved,
    /// Present in both reports.
    Unchanged,
}

impl DiffStatus {
    /// All statuses in display order.
    pub const ALL: [DiffStatus; 3] = [DiffStatus::New, DiffStatus::Solved, DiffStatus::Unchanged];

    /// Sort rank used to group diff output: new, then solved, then unchanged.
    pub fn rank(&self) -> u8 {
        match self {
            DiffStatus::New => 0,
            DiffStatus::Solved => 1,
            DiffStatus::Unchanged => 2,
        }
    }

    /// Stable lowercase key, usable as a CSS class or JSON value.
    pub fn as_str(&self) -> &'static str {
        match self {
            DiffStatus::New => "new",
            DiffStatus::Solved => "solved",
            DiffStatus::Unchanged => "unchanged",
        }
    }

    /// Human-readable label.
    pub fn label(&self) -> &'static str {
        match self {
            DiffStatus::New => "New",
            DiffStatus::Solved => "Solved",
            DiffStatus::Unchanged => "Unchanged",
        }
    }
}

impl std::fmt::Display for DiffStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

// ============================================================================
// Comment
// ============================================================================

/// A single comment matched by a search pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    /// The pattern that matched (e.g. "TODO").
    pub pattern: String,
    /// Path of the source file, relative to the scan root.
    pub file: String,
    /// 1-based line number, or [`UNKNOWN_LINE`].
    pub line: i32,
    /// The matched line and optionally following context lines, verbatim.
    pub source_code: String,
    /// Diff classification; only set on comments produced by a diff.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff_status: Option<DiffStatus>,
}

impl Comment {
    /// Create a comment that has not been diffed.
    pub fn new(
        pattern: impl Into<String>,
        file: impl Into<String>,
        line: i32,
        source_code: impl Into<String>,
    ) -> Self {
        Self {
            pattern: pattern.into(),
            file: file.into(),
            line,
            source_code: source_code.into(),
            diff_status: None,
        }
    }

    /// Copy of this comment tagged with `status`.
    pub fn with_status(&self, status: DiffStatus) -> Self {
        Self {
            diff_status: Some(status),
            ..self.clone()
        }
    }

    /// Whether the line number is the unknown-position sentinel.
    pub fn has_known_line(&self) -> bool {
        self.line > 0
    }

    /// Fingerprint over pattern, file and source code.
    ///
    /// The line number is excluded so the value survives line drift.
    pub fn fingerprint(&self) -> String {
        compute_fingerprint(&[&self.pattern, &self.file, &self.source_code])
    }
}

// ============================================================================
// Report
// ============================================================================

/// Ordered collection of comments gathered from one or more input files.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    comments: Vec<Comment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    version: Option<String>,
}

impl Report {
    /// Create a report from parsed comments.
    pub fn new(comments: Vec<Comment>, version: Option<String>) -> Self {
        Self { comments, version }
    }

    /// A report without comments or format version.
    pub fn empty() -> Self {
        Self::default()
    }

    /// All comments in discovery order.
    pub fn comments(&self) -> &[Comment] {
        &self.comments
    }

    /// Format version carried over from the input file, if any.
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// Consume the report and return its comments.
    pub fn into_comments(self) -> Vec<Comment> {
        self.comments
    }

    /// Concatenate two reports.
    ///
    /// Comments of `self` come first, followed by those of `other`. The
    /// version of `self` is kept unless it is missing or empty.
    pub fn concatenate(&self, other: &Report) -> Report {
        let mut comments = Vec::with_capacity(self.comments.len() + other.comments.len());
        comments.extend(self.comments.iter().cloned());
        comments.extend(other.comments.iter().cloned());

        let version = self
            .version
            .clone()
            .filter(|v| !v.is_empty())
            .or_else(|| other.version.clone());

        Report { comments, version }
    }

    /// Total number of comments.
    pub fn comments_count(&self) -> usize {
        self.comments.len()
    }

    /// Number of comments per pattern.
    pub fn pattern_to_count_mapping(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for comment in &self.comments {
            *counts.entry(comment.pattern.clone()).or_insert(0) += 1;
        }
        counts
    }

    /// Distinct files containing at least one comment with `pattern`.
    ///
    /// An unknown pattern yields an empty set.
    pub fn files_with_pattern(&self, pattern: &str) -> BTreeSet<String> {
        self.comments
            .iter()
            .filter(|c| c.pattern == pattern)
            .map(|c| c.file.clone())
            .collect()
    }

    /// Number of comments carrying `status`.
    pub fn count_with_status(&self, status: DiffStatus) -> usize {
        self.comments
            .iter()
            .filter(|c| c.diff_status == Some(status))
            .count()
    }
}

// ============================================================================
// Statistics
// ============================================================================

/// Statistics of one pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternStatistics {
    pattern: String,
    num_occurrences: usize,
    num_files: usize,
}

impl PatternStatistics {
    pub fn new(pattern: impl Into<String>, num_occurrences: usize, num_files: usize) -> Self {
        Self {
            pattern: pattern.into(),
            num_occurrences,
            num_files,
        }
    }

    /// Zero-valued statistics for a pattern that was never observed.
    pub fn zero(pattern: impl Into<String>) -> Self {
        Self::new(pattern, 0, 0)
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Number of comments matching this pattern.
    pub fn num_occurrences(&self) -> usize {
        self.num_occurrences
    }

    /// Number of distinct files containing this pattern.
    pub fn num_files(&self) -> usize {
        self.num_files
    }
}

/// Statistics of a whole report, computed once from a snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportStatistics {
    total_comments: usize,
    total_files: usize,
    patterns: BTreeMap<String, PatternStatistics>,
    /// Input files the report was built from; process-local.
    #[serde(skip)]
    source_files: BTreeSet<PathBuf>,
}

impl ReportStatistics {
    /// Build statistics from per-pattern entries and the distinct file count.
    ///
    /// The comment total is derived from the per-pattern occurrences.
    pub fn new(
        patterns: impl IntoIterator<Item = PatternStatistics>,
        total_files: usize,
        source_files: BTreeSet<PathBuf>,
    ) -> Self {
        let patterns: BTreeMap<String, PatternStatistics> = patterns
            .into_iter()
            .map(|p| (p.pattern.clone(), p))
            .collect();
        let total_comments = patterns.values().map(|p| p.num_occurrences).sum();
        Self {
            total_comments,
            total_files,
            patterns,
            source_files,
        }
    }

    pub fn total_comments(&self) -> usize {
        self.total_comments
    }

    /// Distinct files across all patterns.
    pub fn total_files(&self) -> usize {
        self.total_files
    }

    /// Per-pattern statistics keyed by pattern name.
    pub fn patterns(&self) -> &BTreeMap<String, PatternStatistics> {
        &self.patterns
    }

    /// Statistics of `pattern`, or a zero-valued placeholder.
    pub fn pattern_statistics(&self, pattern: &str) -> PatternStatistics {
        self.patterns
            .get(pattern)
            .cloned()
            .unwrap_or_else(|| PatternStatistics::zero(pattern))
    }

    pub fn source_files(&self) -> &BTreeSet<PathBuf> {
        &self.source_files
    }
}

// ============================================================================
// Output Documents
// ============================================================================

/// Information about the tool that generated the output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tool {
    pub name: String,
    pub version: String,
}

impl Default for Tool {
    fn default() -> Self {
        Self {
            name: "todos".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Information about the run timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    /// ISO 8601 timestamp when the run started.
    pub started_at: String,
    /// ISO 8601 timestamp when the run ended.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<String>,
    /// Duration of the run in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

/// A diffed comment as written to the output document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentRecord {
    #[serde(flatten)]
    pub comment: Comment,
    /// See [`Comment::fingerprint`].
    pub fingerprint: String,
}

impl From<&Comment> for CommentRecord {
    fn from(comment: &Comment) -> Self {
        Self {
            fingerprint: comment.fingerprint(),
            comment: comment.clone(),
        }
    }
}

/// Number of comments per diff status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffCounts {
    pub new: usize,
    pub solved: usize,
    pub unchanged: usize,
}

impl DiffCounts {
    pub fn from_report(report: &Report) -> Self {
        Self {
            new: report.count_with_status(DiffStatus::New),
            solved: report.count_with_status(DiffStatus::Solved),
            unchanged: report.count_with_status(DiffStatus::Unchanged),
        }
    }
}

/// The document written for one published build.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishReport {
    pub schema: String,
    pub tool: Tool,
    pub run: Run,
    /// Build number, when published into a history store.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build: Option<u64>,
    /// Build the comparison was made against, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_build: Option<u64>,
    /// Format version of the input files.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format_version: Option<String>,
    pub statistics: ReportStatistics,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_statistics: Option<ReportStatistics>,
    /// Absent when there was nothing to compare against.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff: Option<DiffCounts>,
    /// Input files, relative to the scan root.
    pub inputs: Vec<String>,
    pub comments: Vec<CommentRecord>,
}

/// One data point of the trend: comment counts per pattern for one build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrendPoint {
    pub build: u64,
    pub counts: BTreeMap<String, usize>,
}

/// Trend dataset over the archived builds, oldest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendReport {
    pub schema: String,
    pub tool: Tool,
    pub points: Vec<TrendPoint>,
}

// ============================================================================
// Tests
// ============================================================================
