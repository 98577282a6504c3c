//! Application orchestration for todos.
//!
//! This crate wires the adapters and the domain together:
//!
//! 1. Discover the XML reports below a scan root and filter them by path
//! 2. Parse and concatenate them into one report (strictly)
//! 3. Archive the inputs for the current build
//! 4. Rebuild the report of the nearest earlier build (best effort)
//! 5. Diff, compute statistics for both builds and render the summary
//!
//! # Example
//!
//! ```rust,ignore
//! use todos_app::{PublishRequest, publish};
//!
//! let request = PublishRequest {
//!     root: "workspace".into(),
//!     build: Some(42),
//!     ..Default::default()
//! };
//!
//! let result = publish(&request)?;
//! println!("{}", result.summary);
//! ```

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Instant;

use thiserror::Error;
use todos_adapters_fs::{FsHistoryStore, GlobFinder, to_slash};
use todos_adapters_xml::XmlReportParser;
use todos_config::{EffectiveConfig, should_include_path};
use todos_domain::{ReportExt, statistics_delta, trend_point};
pub use todos_ports::Clock;
use todos_ports::{HistoryStore, InputFinder, ReportParser};
use todos_render::{render_markdown, render_summary_text, render_trend_table};
use todos_types::{
    CommentRecord, DiffCounts, PublishReport, Report, ReportStatistics, Run, SCHEMA_ID,
    TREND_SCHEMA_ID, Tool, TrendReport,
};

// ============================================================================
// Clock
// ============================================================================

/// System clock implementation that returns the actual current time.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> chrono::DateTime<chrono::Utc> {
        chrono::Utc::now()
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Errors that abort a publish or compare run.
#[derive(Debug, Error)]
pub enum AppError {
    /// An input file could not be parsed.
    #[error("Failed to parse '{path}': {message}")]
    Parse { path: String, message: String },

    /// The inputs could not be copied into the history store.
    #[error("Failed to archive inputs of build {build}: {source}")]
    Archive {
        build: u64,
        #[source]
        source: std::io::Error,
    },
}

/// Message of the deepest error in the `source()` chain that has one.
///
/// Falls back to the outermost message when every cause is silent.
pub fn root_cause_message(err: &(dyn std::error::Error + 'static)) -> String {
    let mut message = err.to_string();
    let mut current = err.source();
    while let Some(cause) = current {
        let text = cause.to_string();
        if !text.is_empty() {
            message = text;
        }
        current = cause.source();
    }
    message
}

// ============================================================================
// Accumulation
// ============================================================================

/// Parse every file and concatenate the results in order.
///
/// The first failure aborts the whole run.
pub fn collect_strict<P: ReportParser>(parser: &P, files: &[PathBuf]) -> Result<Report, AppError> {
    let mut report = Report::empty();
    for path in files {
        let parsed = parser.parse_file(path).map_err(|err| AppError::Parse {
            path: path.display().to_string(),
            message: root_cause_message(&err),
        })?;
        tracing::debug!(path = %path.display(), comments = parsed.comments_count(), "parsed input");
        report = report.concatenate(&parsed);
    }
    Ok(report)
}

/// Parse every file and concatenate the results in order, skipping files that
/// fail to parse.
pub fn collect_best_effort<P: ReportParser>(parser: &P, files: &[PathBuf]) -> Report {
    let mut report = Report::empty();
    for path in files {
        match parser.parse_file(path) {
            Ok(parsed) => report = report.concatenate(&parsed),
            Err(err) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %root_cause_message(&err),
                    "skipping unreadable report"
                );
            }
        }
    }
    report
}

// ============================================================================
// History
// ============================================================================

/// Report rebuilt from the archive of an earlier build.
#[derive(Debug, Clone)]
pub struct PreviousReport {
    pub build: u64,
    pub report: Report,
    pub files: Vec<PathBuf>,
}

/// Rebuild the report of the nearest build before `build` that has an
/// archive. `None` when there is no such build.
pub fn previous_report<S: HistoryStore, P: ReportParser>(
    store: &S,
    parser: &P,
    build: u64,
) -> Option<PreviousReport> {
    for candidate in store.builds().into_iter().rev().filter(|b| *b < build) {
        if let Some(files) = store.archived_files(candidate) {
            tracing::info!(build, previous = candidate, "comparing against previous build");
            let report = collect_best_effort(parser, &files);
            return Some(PreviousReport {
                build: candidate,
                report,
                files,
            });
        }
    }
    tracing::info!(build, "no previous build to compare against");
    None
}

// ============================================================================
// Request and Result Types
// ============================================================================

/// Request for a publish run.
#[derive(Debug, Clone, Default)]
pub struct PublishRequest {
    /// Directory scanned for input files.
    pub root: PathBuf,
    /// Build number. Without one nothing is archived or compared.
    pub build: Option<u64>,
    /// Resolved configuration.
    pub config: EffectiveConfig,
}

/// Request for a standalone comparison of two sets of input files.
#[derive(Debug, Clone)]
pub struct CompareRequest {
    pub current: Vec<PathBuf>,
    /// Files of the earlier report. Empty means nothing to compare against.
    pub previous: Vec<PathBuf>,
    pub max_detail_rows: usize,
}

/// Outcome of a publish or compare run.
#[derive(Debug, Clone)]
pub struct PublishResult {
    /// Serializable output document.
    pub report: PublishReport,
    /// The diffed report.
    pub diffed: Report,
    /// Markdown rendering (summary, patterns and detail table).
    pub markdown: String,
    /// Plain-text summary.
    pub summary: String,
}

/// Outcome of a trend run.
#[derive(Debug, Clone)]
pub struct TrendResult {
    pub report: TrendReport,
    /// Markdown table of the trend.
    pub table: String,
}

// ============================================================================
// Publish
// ============================================================================

/// Publish a build using the filesystem adapters and the system clock.
pub fn publish(request: &PublishRequest) -> Result<PublishResult, AppError> {
    let store = FsHistoryStore::new(request.config.history_dir.clone());
    publish_with(request, &GlobFinder, &XmlReportParser, &store, &SystemClock)
}

/// Publish a build with explicit adapters.
///
/// # Errors
///
/// Returns `AppError::Parse` when an input file cannot be parsed and
/// `AppError::Archive` when the inputs cannot be archived.
pub fn publish_with<F, P, S, C>(
    request: &PublishRequest,
    finder: &F,
    parser: &P,
    store: &S,
    clock: &C,
) -> Result<PublishResult, AppError>
where
    F: InputFinder,
    P: ReportParser,
    S: HistoryStore,
    C: Clock,
{
    let started_at = clock.now();
    let timer = Instant::now();
    let config = &request.config;

    let inputs = discover_inputs(finder, &request.root, config);
    if inputs.is_empty() {
        tracing::warn!(
            root = %request.root.display(),
            pattern = %config.pattern,
            "no input files matched"
        );
    }

    let full_paths: Vec<PathBuf> = inputs.iter().map(|p| request.root.join(p)).collect();
    let current = collect_strict(parser, &full_paths)?;

    let previous = match request.build {
        Some(build) => {
            store
                .archive(build, &request.root, &inputs)
                .map_err(|source| AppError::Archive { build, source })?;
            previous_report(store, parser, build)
        }
        None => None,
    };

    let outcome = Outcome {
        current: &current,
        current_files: full_paths,
        previous: previous.as_ref().map(|p| (&p.report, p.files.clone())),
        max_detail_rows: config.max_detail_rows,
    };
    let mut result = outcome.finish(clock, started_at, inputs.iter().map(|p| to_slash(p)).collect());
    result.report.build = request.build;
    result.report.previous_build = previous.map(|p| p.build);

    tracing::info!(
        comments = result.report.statistics.total_comments(),
        files = result.report.statistics.total_files(),
        elapsed_ms = timer.elapsed().as_millis() as u64,
        "publish finished"
    );
    Ok(result)
}

/// Discover input files and apply the include/exclude filters.
fn discover_inputs<F: InputFinder>(finder: &F, root: &Path, config: &EffectiveConfig) -> Vec<PathBuf> {
    let discovered = finder.find_matching_files(root, &config.pattern);
    let total = discovered.len();
    let kept: Vec<PathBuf> = discovered
        .into_iter()
        .filter(|path| {
            should_include_path(
                &to_slash(path),
                &config.include_patterns,
                &config.exclude_patterns,
            )
        })
        .collect();
    tracing::debug!(discovered = total, kept = kept.len(), "filtered input files");
    kept
}

// ============================================================================
// Compare
// ============================================================================

/// Diff two explicit sets of input files without a history store.
///
/// Both sets are parsed strictly since the caller named every file.
pub fn compare(request: &CompareRequest) -> Result<PublishResult, AppError> {
    compare_with(request, &XmlReportParser, &SystemClock)
}

/// [`compare`] with explicit adapters.
pub fn compare_with<P: ReportParser, C: Clock>(
    request: &CompareRequest,
    parser: &P,
    clock: &C,
) -> Result<PublishResult, AppError> {
    let started_at = clock.now();
    let current = collect_strict(parser, &request.current)?;
    let previous = if request.previous.is_empty() {
        None
    } else {
        Some(collect_strict(parser, &request.previous)?)
    };

    let outcome = Outcome {
        current: &current,
        current_files: request.current.clone(),
        previous: previous.as_ref().map(|r| (r, request.previous.clone())),
        max_detail_rows: request.max_detail_rows,
    };
    let inputs = request.current.iter().map(|p| p.display().to_string()).collect();
    Ok(outcome.finish(clock, started_at, inputs))
}

/// Shared tail of publish and compare: diff, statistics, rendering.
struct Outcome<'a> {
    current: &'a Report,
    current_files: Vec<PathBuf>,
    previous: Option<(&'a Report, Vec<PathBuf>)>,
    max_detail_rows: usize,
}

impl Outcome<'_> {
    fn finish<C: Clock>(
        self,
        clock: &C,
        started_at: chrono::DateTime<chrono::Utc>,
        inputs: Vec<String>,
    ) -> PublishResult {
        let previous_report = self.previous.as_ref().map(|(report, _)| *report);
        let diffed = self.current.diff(previous_report);

        let statistics = self
            .current
            .statistics(self.current_files.into_iter().collect::<BTreeSet<_>>());
        let previous_statistics: Option<ReportStatistics> = self
            .previous
            .map(|(report, files)| report.statistics(files.into_iter().collect()));

        let delta = statistics_delta(&statistics, previous_statistics.as_ref());
        let summary = render_summary_text(&delta);
        let markdown = render_markdown(&diffed, &delta, self.max_detail_rows);

        let ended_at = clock.now();
        let report = PublishReport {
            schema: SCHEMA_ID.to_string(),
            tool: Tool::default(),
            run: Run {
                started_at: started_at.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
                ended_at: Some(ended_at.format("%Y-%m-%dT%H:%M:%SZ").to_string()),
                duration_ms: Some((ended_at - started_at).num_milliseconds().max(0) as u64),
            },
            build: None,
            previous_build: None,
            format_version: self.current.version().map(str::to_string),
            statistics,
            diff: previous_statistics.as_ref().map(|_| DiffCounts::from_report(&diffed)),
            previous_statistics,
            inputs,
            comments: diffed.comments().iter().map(CommentRecord::from).collect(),
        };

        PublishResult {
            report,
            diffed,
            markdown,
            summary,
        }
    }
}

// ============================================================================
// Trend
// ============================================================================

/// Trend over the last `builds` archived builds of the filesystem store.
pub fn trend(history_dir: &Path, builds: usize) -> TrendResult {
    trend_with(&FsHistoryStore::new(history_dir), &XmlReportParser, builds)
}

/// Trend over the last `builds` archived builds, oldest first.
///
/// Archived files are parsed best effort.
pub fn trend_with<S: HistoryStore, P: ReportParser>(
    store: &S,
    parser: &P,
    builds: usize,
) -> TrendResult {
    let all = store.builds();
    let skip = all.len().saturating_sub(builds);

    let points: Vec<_> = all
        .into_iter()
        .skip(skip)
        .filter_map(|build| {
            let files = store.archived_files(build)?;
            Some(trend_point(build, &collect_best_effort(parser, &files)))
        })
        .collect();
    tracing::debug!(points = points.len(), "built trend");

    let table = render_trend_table(&points);
    TrendResult {
        report: TrendReport {
            schema: TREND_SCHEMA_ID.to_string(),
            tool: Tool::default(),
            points,
        },
        table,
    }
}

// ============================================================================
// Tests
// ============================================================================
