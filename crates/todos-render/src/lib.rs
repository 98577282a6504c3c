//! Rendering utilities for todos reports.
//!
//! This crate turns diffed reports and statistics into human-readable output:
//! - a plain-text summary with signed differences against the previous build
//! - a Markdown report (summary, per-pattern table, detail table)
//! - a Markdown trend table
//!
//! # Example
//!
//! ```rust
//! use todos_domain::{ReportExt, statistics_delta};
//! use todos_render::{render_markdown, render_summary_text};
//! use todos_types::{Comment, Report};
//!
//! let report = Report::new(vec![Comment::new("TODO", "a.rs", 1, "// TODO")], None);
//! let stats = report.statistics(Default::default());
//! let delta = statistics_delta(&stats, None);
//!
//! assert_eq!(render_summary_text(&delta).lines().next(), Some("1 comment in 1 file"));
//! let markdown = render_markdown(&report.diff(None), &delta, 10);
//! assert!(markdown.contains("| TODO | 1 | 1 |"));
//! ```

use todos_domain::{Delta, StatisticsDelta};
use todos_types::{Comment, DiffStatus, Report, TrendPoint};

/// Default maximum number of rows in the Markdown detail table.
pub const DEFAULT_MAX_ROWS: usize = 50;

// ============================================================================
// Number formatting
// ============================================================================

/// Format `value` with `,` as thousands separator.
///
/// # Examples
///
/// ```rust
/// use todos_render::grouping;
///
/// assert_eq!(grouping(1234567), "1,234,567");
/// assert_eq!(grouping(-1000), "-1,000");
/// assert_eq!(grouping(999), "999");
/// ```
pub fn grouping(value: i64) -> String {
    let digits = value.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if value < 0 {
        grouped.push('-');
    }
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    grouped
}

fn grouping_usize(value: usize) -> String {
    grouping(i64::try_from(value).unwrap_or(i64::MAX))
}

/// Signed difference suffix such as ` (+3)` or ` (-1,200)`.
///
/// Empty when there is nothing to compare against or the value is unchanged.
pub fn format_difference(delta: &Delta) -> String {
    match delta.change() {
        Some(change) if change > 0 => format!(" (+{})", grouping(change)),
        Some(change) if change < 0 => format!(" ({})", grouping(change)),
        _ => String::new(),
    }
}

/// Current value followed by its difference suffix.
fn counted(delta: &Delta) -> String {
    format!("{}{}", grouping_usize(delta.current), format_difference(delta))
}

fn plural(count: usize, singular: &'static str, plural: &'static str) -> &'static str {
    if count == 1 { singular } else { plural }
}

// ============================================================================
// Plain-text summary
// ============================================================================

/// Renders the summary as plain text.
///
/// The first line holds the totals, e.g. `12 (+3) comments in 4 (-1) files`,
/// followed by one line per pattern.
pub fn render_summary_text(delta: &StatisticsDelta) -> String {
    let mut output = format!(
        "{} {} in {} {}\n",
        counted(&delta.comments),
        plural(delta.comments.current, "comment", "comments"),
        counted(&delta.files),
        plural(delta.files.current, "file", "files"),
    );

    for pattern in &delta.patterns {
        output.push_str(&format!(
            "  {}: {} in {} {}\n",
            pattern.pattern,
            counted(&pattern.occurrences),
            counted(&pattern.files),
            plural(pattern.files.current, "file", "files"),
        ));
    }

    output
}

// ============================================================================
// Markdown
// ============================================================================

/// Escape text for use inside a Markdown table cell.
///
/// # Examples
///
/// ```rust
/// use todos_render::escape_cell;
///
/// assert_eq!(escape_cell("a | b"), "a \\| b");
/// assert_eq!(escape_cell("<b>"), "&lt;b&gt;");
/// ```
pub fn escape_cell(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '|' => escaped.push_str("\\|"),
            '\\' => escaped.push_str("\\\\"),
            '`' => escaped.push_str("\\`"),
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '\r' | '\n' => escaped.push(' '),
            _ => escaped.push(ch),
        }
    }
    escaped
}

/// First non-blank line of a comment's source, trimmed.
fn first_line(source: &str) -> &str {
    source
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("")
}

fn status_cell(comment: &Comment) -> &'static str {
    comment.diff_status.map(|s| s.label()).unwrap_or("-")
}

fn line_cell(comment: &Comment) -> String {
    if comment.has_known_line() {
        comment.line.to_string()
    } else {
        "-".to_string()
    }
}

/// Renders a diffed report as Markdown.
///
/// # Arguments
///
/// * `report` - Report to list, usually the output of a diff.
/// * `delta` - Statistics of the report compared with the previous build.
/// * `max_rows` - Maximum number of comments in the detail table.
///
/// # Example Output
///
/// ```markdown
/// ## todos: Comment Report
///
/// **12 (+3)** comments in **4 (-1)** files
///
/// - **New**: 4
/// - **Solved**: 1
/// - **Unchanged**: 8
///
/// ### Patterns
///
/// | Pattern | Comments | Files |
/// |---------|----------|-------|
/// | TODO | 10 (+3) | 4 |
///
/// ### Comments
///
/// | Status | Pattern | File | Line | Source |
/// |--------|---------|------|------|--------|
/// | New | TODO | src/lib.rs | 12 | // TODO: split |
///
/// *Showing 1 of 13 comments*
/// ```
pub fn render_markdown(report: &Report, delta: &StatisticsDelta, max_rows: usize) -> String {
    let mut output = String::new();

    output.push_str("## todos: Comment Report\n\n");
    output.push_str(&format!(
        "**{}** {} in **{}** {}\n",
        counted(&delta.comments),
        plural(delta.comments.current, "comment", "comments"),
        counted(&delta.files),
        plural(delta.files.current, "file", "files"),
    ));

    let tagged = report.comments().iter().any(|c| c.diff_status.is_some());
    if tagged {
        output.push('\n');
        for status in DiffStatus::ALL {
            output.push_str(&format!(
                "- **{}**: {}\n",
                status.label(),
                grouping_usize(report.count_with_status(status))
            ));
        }
    }

    if !delta.patterns.is_empty() {
        output.push_str("\n### Patterns\n\n");
        output.push_str("| Pattern | Comments | Files |\n");
        output.push_str("|---------|----------|-------|\n");
        for pattern in &delta.patterns {
            output.push_str(&format!(
                "| {} | {} | {} |\n",
                escape_cell(&pattern.pattern),
                counted(&pattern.occurrences),
                counted(&pattern.files),
            ));
        }
    }

    let comments = report.comments();
    if !comments.is_empty() {
        output.push_str("\n### Comments\n\n");
        output.push_str("| Status | Pattern | File | Line | Source |\n");
        output.push_str("|--------|---------|------|------|--------|\n");

        for comment in comments.iter().take(max_rows) {
            output.push_str(&format!(
                "| {} | {} | {} | {} | {} |\n",
                status_cell(comment),
                escape_cell(&comment.pattern),
                escape_cell(&comment.file),
                line_cell(comment),
                escape_cell(first_line(&comment.source_code)),
            ));
        }

        if comments.len() > max_rows {
            output.push_str(&format!(
                "\n*Showing {} of {} comments*\n",
                max_rows,
                comments.len()
            ));
        }
    }

    output
}

/// Renders trend points as a Markdown table with one column per pattern.
///
/// Patterns missing from a build are shown as `0`.
pub fn render_trend_table(points: &[TrendPoint]) -> String {
    let patterns = todos_domain::trend_patterns(points);
    let mut output = String::new();

    output.push_str("| Build |");
    for pattern in &patterns {
        output.push_str(&format!(" {} |", escape_cell(pattern)));
    }
    output.push_str(" Total |\n|-------|");
    for _ in &patterns {
        output.push_str("---|");
    }
    output.push_str("-------|\n");

    for point in points {
        output.push_str(&format!("| {} |", point.build));
        for pattern in &patterns {
            let count = point.counts.get(pattern).copied().unwrap_or(0);
            output.push_str(&format!(" {} |", grouping_usize(count)));
        }
        let total: usize = point.counts.values().sum();
        output.push_str(&format!(" {} |\n", grouping_usize(total)));
    }

    output
}

// ============================================================================
// Tests
// ============================================================================
