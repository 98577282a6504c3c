//! Configuration parsing and management for todos.
//!
//! This crate provides:
//! - Configuration types (`Config`, `PathConfig`)
//! - TOML parsing and validation
//! - Discovery of `todos.toml` in the current or a parent directory
//! - Precedence handling (CLI > config file > defaults)

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

// ============================================================================
// Errors
// ============================================================================

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Invalid configuration value.
    #[error("Invalid config value: {0}")]
    InvalidValue(String),
}

// ============================================================================
// Configuration Types
// ============================================================================

/// File name searched for by [`discover_config`].
pub const CONFIG_FILE_NAME: &str = "todos.toml";

/// Input pattern used when none is configured.
pub const DEFAULT_PATTERN: &str = "**/todos.xml";

/// Directory holding per-build archives when none is configured.
pub const DEFAULT_HISTORY_DIR: &str = ".todos/builds";

pub const DEFAULT_MAX_DETAIL_ROWS: usize = 50;
pub const DEFAULT_TREND_BUILDS: usize = 10;

/// Path filtering configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PathConfig {
    /// Glob patterns for input files to exclude.
    #[serde(default)]
    pub exclude: Vec<String>,
    /// Glob patterns for input files to include (allowlist).
    /// If empty, all discovered files are included.
    #[serde(default)]
    pub include: Vec<String>,
}

/// Contents of a `todos.toml` file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Glob selecting the XML reports below the scan root.
    #[serde(default)]
    pub pattern: Option<String>,

    /// Where per-build archives are kept.
    #[serde(default)]
    pub history_dir: Option<PathBuf>,

    /// Maximum rows in the markdown detail table.
    #[serde(default)]
    pub max_detail_rows: Option<usize>,

    /// Number of most recent builds in the trend dataset.
    #[serde(default)]
    pub trend_builds: Option<usize>,

    #[serde(default)]
    pub paths: PathConfig,
}

// ============================================================================
// Effective Configuration
// ============================================================================

/// Effective configuration with all values resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectiveConfig {
    pub pattern: String,
    pub history_dir: PathBuf,
    pub max_detail_rows: usize,
    pub trend_builds: usize,
    pub exclude_patterns: Vec<String>,
    pub include_patterns: Vec<String>,
}

impl Default for EffectiveConfig {
    fn default() -> Self {
        Self {
            pattern: DEFAULT_PATTERN.to_string(),
            history_dir: PathBuf::from(DEFAULT_HISTORY_DIR),
            max_detail_rows: DEFAULT_MAX_DETAIL_ROWS,
            trend_builds: DEFAULT_TREND_BUILDS,
            exclude_patterns: vec![],
            include_patterns: vec![],
        }
    }
}

// ============================================================================
// Configuration Loading
// ============================================================================

/// Load configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Load configuration from a TOML string.
pub fn parse_config(content: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(content)?;
    validate_config(&config)?;
    Ok(config)
}

fn validate_config(config: &Config) -> Result<(), ConfigError> {
    validate_values(
        config.pattern.as_deref(),
        config.max_detail_rows,
        config.trend_builds,
        config.paths.exclude.iter().chain(&config.paths.include),
    )
}

/// Checks shared by the config file and CLI overrides.
fn validate_values<'a>(
    pattern: Option<&str>,
    max_detail_rows: Option<usize>,
    trend_builds: Option<usize>,
    path_patterns: impl IntoIterator<Item = &'a String>,
) -> Result<(), ConfigError> {
    if let Some(pattern) = pattern
        && pattern.trim().is_empty()
    {
        return Err(ConfigError::InvalidValue(
            "pattern must not be empty".to_string(),
        ));
    }
    if max_detail_rows == Some(0) {
        return Err(ConfigError::InvalidValue(
            "max_detail_rows must be at least 1".to_string(),
        ));
    }
    if trend_builds == Some(0) {
        return Err(ConfigError::InvalidValue(
            "trend_builds must be at least 1".to_string(),
        ));
    }
    for pattern in path_patterns {
        if let Err(err) = glob::Pattern::new(pattern) {
            return Err(ConfigError::InvalidValue(format!(
                "invalid path pattern '{pattern}': {err}"
            )));
        }
    }
    Ok(())
}

/// Try to find and load configuration from the standard location.
///
/// Searches for `todos.toml` in `start` and its parent directories. A file
/// that fails to load is skipped and the search continues upwards.
pub fn discover_config(start: &Path) -> Option<(PathBuf, Config)> {
    let mut current = start.to_path_buf();

    loop {
        let config_path = current.join(CONFIG_FILE_NAME);
        if config_path.exists()
            && let Ok(config) = load_config(&config_path)
        {
            return Some((config_path, config));
        }

        if !current.pop() {
            break;
        }
    }

    None
}

// ============================================================================
// Precedence Resolution
// ============================================================================

/// CLI override options.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub pattern: Option<String>,
    pub history_dir: Option<PathBuf>,
    pub max_detail_rows: Option<usize>,
    pub trend_builds: Option<usize>,
    pub exclude_patterns: Option<Vec<String>>,
}

/// Resolve effective configuration from config file and CLI overrides.
///
/// Precedence: CLI > config file > defaults
///
/// CLI overrides are validated like file values, so `--max-detail-rows 0`
/// or an exclude of `[` is rejected whichever source it comes from.
pub fn resolve_config(
    config: Option<&Config>,
    cli: &CliOverrides,
) -> Result<EffectiveConfig, ConfigError> {
    validate_values(
        cli.pattern.as_deref(),
        cli.max_detail_rows,
        cli.trend_builds,
        cli.exclude_patterns.iter().flatten(),
    )?;

    let mut effective = EffectiveConfig::default();

    if let Some(config) = config {
        if let Some(pattern) = &config.pattern {
            effective.pattern = pattern.clone();
        }
        if let Some(dir) = &config.history_dir {
            effective.history_dir = dir.clone();
        }
        if let Some(rows) = config.max_detail_rows {
            effective.max_detail_rows = rows;
        }
        if let Some(builds) = config.trend_builds {
            effective.trend_builds = builds;
        }
        effective.exclude_patterns = config.paths.exclude.clone();
        effective.include_patterns = config.paths.include.clone();
    }

    if let Some(pattern) = &cli.pattern {
        effective.pattern = pattern.clone();
    }
    if let Some(dir) = &cli.history_dir {
        effective.history_dir = dir.clone();
    }
    if let Some(rows) = cli.max_detail_rows {
        effective.max_detail_rows = rows;
    }
    if let Some(builds) = cli.trend_builds {
        effective.trend_builds = builds;
    }
    if let Some(exclude) = &cli.exclude_patterns {
        effective.exclude_patterns.extend(exclude.iter().cloned());
    }

    Ok(effective)
}

// ============================================================================
// Path Filtering
// ============================================================================

/// Check if a path matches any of the given glob patterns.
pub fn matches_any_pattern(path: &str, patterns: &[String]) -> bool {
    patterns.iter().any(|pattern| {
        glob::Pattern::new(pattern)
            .map(|glob| glob.matches(path))
            .unwrap_or(false)
    })
}

/// Filter a path based on include/exclude patterns.
///
/// Returns `true` if the input file should be parsed.
pub fn should_include_path(
    path: &str,
    include_patterns: &[String],
    exclude_patterns: &[String],
) -> bool {
    if matches_any_pattern(path, exclude_patterns) {
        return false;
    }

    include_patterns.is_empty() || matches_any_pattern(path, include_patterns)
}

// ============================================================================
// Tests
// ============================================================================
