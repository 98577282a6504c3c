//! Filesystem adapters: input discovery and the per-build history store.

use std::path::{Path, PathBuf};

use glob::{MatchOptions, Pattern};
use todos_ports::{HistoryStore, InputFinder};
use walkdir::WalkDir;

/// Name of the per-build subdirectory that holds archived inputs.
pub const ARCHIVE_DIR_NAME: &str = "todos-plugin";

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// Render `path` with forward slashes so glob patterns behave the same on
/// every platform.
pub fn to_slash(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// All regular files below `dir`, relative to it, in file-name order.
///
/// Symbolic links are followed. Entries that cannot be read (unreadable
/// directories, broken links, link cycles) are skipped with a warning; only
/// an unreadable `dir` itself is an error.
fn relative_files(dir: &Path) -> walkdir::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).follow_links(true).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) if err.depth() == 0 => return Err(err),
            Err(err) => {
                tracing::warn!(
                    path = %err.path().map(|p| p.display().to_string()).unwrap_or_default(),
                    error = %err,
                    "skipping unreadable entry"
                );
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        if let Ok(relative) = entry.path().strip_prefix(dir) {
            files.push(relative.to_path_buf());
        }
    }
    Ok(files)
}

// ============================================================================
// Input discovery
// ============================================================================

/// Glob-based [`InputFinder`].
///
/// `*` stays within one path segment, `**/` spans any number of directories
/// (including none), so `**/todos.xml` also matches a file at the root.
#[derive(Debug, Clone, Copy, Default)]
pub struct GlobFinder;

impl InputFinder for GlobFinder {
    fn find_matching_files(&self, root: &Path, pattern: &str) -> Vec<PathBuf> {
        let glob = match Pattern::new(pattern) {
            Ok(glob) => glob,
            Err(err) => {
                tracing::warn!(pattern, error = %err, "invalid input pattern");
                return Vec::new();
            }
        };

        let files = match relative_files(root) {
            Ok(files) => files,
            Err(err) => {
                tracing::warn!(root = %root.display(), error = %err, "cannot scan input root");
                return Vec::new();
            }
        };

        let matched: Vec<PathBuf> = files
            .into_iter()
            .filter(|path| glob.matches_with(&to_slash(path), MATCH_OPTIONS))
            .collect();
        tracing::debug!(pattern, count = matched.len(), "discovered input files");
        matched
    }
}

// ============================================================================
// History store
// ============================================================================

/// [`HistoryStore`] laid out as `<dir>/<build>/todos-plugin/<relative path>`.
#[derive(Debug, Clone)]
pub struct FsHistoryStore {
    dir: PathBuf,
}

impl FsHistoryStore {
    /// Create a store rooted at `dir`. Nothing is created until the first
    /// archive.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Archive directory of `build`.
    pub fn archive_dir(&self, build: u64) -> PathBuf {
        self.dir.join(build.to_string()).join(ARCHIVE_DIR_NAME)
    }
}

impl HistoryStore for FsHistoryStore {
    /// Replaces any earlier archive of `build`, so a republished build holds
    /// exactly the files of its last run.
    fn archive(&self, build: u64, root: &Path, files: &[PathBuf]) -> std::io::Result<()> {
        let target = self.archive_dir(build);
        match std::fs::remove_dir_all(&target) {
            Ok(()) => tracing::debug!(build, "replacing existing archive"),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(err),
        }
        std::fs::create_dir_all(&target)?;

        for file in files {
            let destination = target.join(file);
            if let Some(parent) = destination.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::copy(root.join(file), &destination)?;
        }

        tracing::info!(build, count = files.len(), dir = %target.display(), "archived input files");
        Ok(())
    }

    fn builds(&self) -> Vec<u64> {
        let Ok(entries) = std::fs::read_dir(&self.dir) else {
            return Vec::new();
        };

        let mut builds: Vec<u64> = entries
            .filter_map(Result::ok)
            .filter_map(|entry| entry.file_name().to_str()?.parse::<u64>().ok())
            .filter(|build| self.archive_dir(*build).is_dir())
            .collect();
        builds.sort_unstable();
        builds
    }

    fn archived_files(&self, build: u64) -> Option<Vec<PathBuf>> {
        let dir = self.archive_dir(build);
        if !dir.is_dir() {
            return None;
        }

        match relative_files(&dir) {
            Ok(files) => Some(files.into_iter().map(|file| dir.join(file)).collect()),
            Err(err) => {
                tracing::warn!(build, error = %err, "cannot list archived files");
                Some(Vec::new())
            }
        }
    }
}
