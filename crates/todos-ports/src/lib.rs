//! Shared port traits for todos' hexagonal architecture.

use std::path::{Path, PathBuf};

use todos_types::Report;

/// Port for discovering input files below a scan root.
pub trait InputFinder {
    /// Return the files below `root` whose relative path matches `pattern`,
    /// as paths relative to `root`, in a deterministic order.
    ///
    /// Discovery failures (e.g. an invalid pattern) yield an empty list.
    fn find_matching_files(&self, root: &Path, pattern: &str) -> Vec<PathBuf>;
}

/// Port for turning one input file into a report.
pub trait ReportParser {
    /// The parser's error type.
    type Error: std::error::Error + 'static;

    /// Parse the file at `path`.
    fn parse_file(&self, path: &Path) -> Result<Report, Self::Error>;
}

/// Port for the per-build archive of input files.
pub trait HistoryStore {
    /// Copy `files` (relative to `root`) into the archive of `build`,
    /// replacing whatever that build archived before.
    fn archive(&self, build: u64, root: &Path, files: &[PathBuf]) -> std::io::Result<()>;

    /// All builds that have an archive, ascending.
    fn builds(&self) -> Vec<u64>;

    /// Full paths of the archived files of `build`, or `None` when the build
    /// has no archive.
    fn archived_files(&self, build: u64) -> Option<Vec<PathBuf>>;
}

/// Port for obtaining the current UTC time.
pub trait Clock {
    /// Returns the current time in UTC.
    fn now(&self) -> chrono::DateTime<chrono::Utc>;
}
