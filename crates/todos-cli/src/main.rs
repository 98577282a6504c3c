//! todos tracks TODO/FIXME-style comments across builds: it accumulates the
//! XML comment reports of a workspace, compares them with the previous build
//! and writes a JSON report plus optional Markdown.

use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Once;
use thiserror::Error;
use todos_app::{AppError, CompareRequest, PublishRequest, compare, publish, trend};
use todos_config::{CliOverrides, Config, EffectiveConfig, discover_config, load_config, resolve_config};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const EXIT_CODE_OK: i32 = 0;
const EXIT_CODE_ERROR: i32 = 1;

/// Environment variable holding the log filter.
const LOG_ENV: &str = "TODOS_LOG";

/// Track TODO/FIXME comments across builds.
#[derive(Parser)]
#[command(name = "todos")]
#[command(about = "Track TODO/FIXME comments across builds from XML comment reports.")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Publish the reports of a workspace, archive them and compare with the previous build
    Publish {
        /// Directory scanned for input reports
        #[arg(long, default_value = ".")]
        root: PathBuf,

        /// Build number; without it nothing is archived or compared
        #[arg(long)]
        build: Option<u64>,

        /// Glob selecting input reports (overrides config file)
        #[arg(long)]
        pattern: Option<String>,

        /// Directory of the build history (overrides config file)
        #[arg(long)]
        history_dir: Option<PathBuf>,

        /// Glob of input reports to skip (repeatable, added to config file excludes)
        #[arg(long)]
        exclude: Vec<String>,

        /// Maximum rows in the Markdown detail table (overrides config file)
        #[arg(long)]
        max_detail_rows: Option<usize>,

        /// Output path for report JSON
        #[arg(long, default_value = "artifacts/todos/report.json")]
        out: PathBuf,

        /// Output path for Markdown
        #[arg(long)]
        md: Option<PathBuf>,

        /// Path to config file (default: auto-discover todos.toml)
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,
    },

    /// Compare two explicit sets of report files
    Compare {
        /// Report files of the current state (repeatable)
        #[arg(long, required = true)]
        current: Vec<PathBuf>,

        /// Report files of the earlier state (repeatable)
        #[arg(long)]
        previous: Vec<PathBuf>,

        /// Maximum rows in the Markdown detail table (overrides config file)
        #[arg(long)]
        max_detail_rows: Option<usize>,

        /// Output path for report JSON
        #[arg(long, default_value = "artifacts/todos/compare.json")]
        out: PathBuf,

        /// Output path for Markdown
        #[arg(long)]
        md: Option<PathBuf>,

        /// Path to config file (default: auto-discover todos.toml)
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,
    },

    /// Comment counts per pattern over the most recent builds
    Trend {
        /// Directory of the build history (overrides config file)
        #[arg(long)]
        history_dir: Option<PathBuf>,

        /// Number of builds to include (overrides config file)
        #[arg(long)]
        builds: Option<usize>,

        /// Output path for trend JSON
        #[arg(long, default_value = "artifacts/todos/trend.json")]
        out: PathBuf,

        /// Output path for the Markdown trend table
        #[arg(long)]
        md: Option<PathBuf>,

        /// Path to config file (default: auto-discover todos.toml)
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,
    },
}

#[derive(Debug, Error)]
enum CliError {
    #[error("Failed to write file '{path}': {source}")]
    FileWrite {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to create directory '{path}': {source}")]
    DirCreate {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize report: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Failed to load config: {0}")]
    ConfigLoad(String),

    #[error("{0}")]
    App(#[from] AppError),
}

static INIT_TRACING: Once = Once::new();

/// Install the stderr subscriber, filtered by `TODOS_LOG` (default `warn`).
fn init_tracing() {
    INIT_TRACING.call_once(|| {
        let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));

        tracing_subscriber::registry()
            .with(fmt::layer().with_writer(std::io::stderr).with_target(true))
            .with(filter)
            .init();
    });
}

fn main() {
    init_tracing();
    let cli = Cli::parse();
    let exit_code = match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {}", e);
            EXIT_CODE_ERROR
        }
    };
    std::process::exit(exit_code);
}

fn run(cli: Cli) -> Result<i32, CliError> {
    match cli.command {
        Commands::Publish {
            root,
            build,
            pattern,
            history_dir,
            exclude,
            max_detail_rows,
            out,
            md,
            config,
        } => {
            let overrides = CliOverrides {
                pattern,
                history_dir,
                max_detail_rows,
                exclude_patterns: (!exclude.is_empty()).then_some(exclude),
                ..Default::default()
            };
            let config = effective_config(config.as_deref(), &overrides)?;
            run_publish(root, build, config, &out, md.as_deref())
        }
        Commands::Compare {
            current,
            previous,
            max_detail_rows,
            out,
            md,
            config,
        } => {
            let overrides = CliOverrides {
                max_detail_rows,
                ..Default::default()
            };
            let config = effective_config(config.as_deref(), &overrides)?;
            let request = CompareRequest {
                current,
                previous,
                max_detail_rows: config.max_detail_rows,
            };
            let result = compare(&request)?;
            write_output(&out, &serde_json::to_string_pretty(&result.report)?)?;
            if let Some(md) = md {
                write_output(&md, &result.markdown)?;
            }
            print!("{}", result.summary);
            Ok(EXIT_CODE_OK)
        }
        Commands::Trend {
            history_dir,
            builds,
            out,
            md,
            config,
        } => {
            let overrides = CliOverrides {
                history_dir,
                trend_builds: builds,
                ..Default::default()
            };
            let config = effective_config(config.as_deref(), &overrides)?;
            let result = trend(&config.history_dir, config.trend_builds);
            write_output(&out, &serde_json::to_string_pretty(&result.report)?)?;
            if let Some(md) = md {
                write_output(&md, &result.table)?;
            }
            print!("{}", result.table);
            Ok(EXIT_CODE_OK)
        }
    }
}

fn run_publish(
    root: PathBuf,
    build: Option<u64>,
    config: EffectiveConfig,
    out: &Path,
    md: Option<&Path>,
) -> Result<i32, CliError> {
    let request = PublishRequest {
        root,
        build,
        config,
    };
    let result = publish(&request)?;

    write_output(out, &serde_json::to_string_pretty(&result.report)?)?;
    if let Some(md) = md {
        write_output(md, &result.markdown)?;
    }
    print!("{}", result.summary);
    Ok(EXIT_CODE_OK)
}

/// Load the explicit config file, or discover one from the current directory.
fn load_file_config(path: Option<&Path>) -> Result<Option<Config>, CliError> {
    match path {
        Some(path) => load_config(path)
            .map(Some)
            .map_err(|e| CliError::ConfigLoad(format!("{}: {}", path.display(), e))),
        None => {
            let discovered = std::env::current_dir()
                .ok()
                .and_then(|cwd| discover_config(&cwd));
            if let Some((path, _)) = &discovered {
                tracing::debug!(path = %path.display(), "using discovered config");
            }
            Ok(discovered.map(|(_, config)| config))
        }
    }
}

fn effective_config(
    path: Option<&Path>,
    overrides: &CliOverrides,
) -> Result<EffectiveConfig, CliError> {
    let file = load_file_config(path)?;
    resolve_config(file.as_ref(), overrides)
        .map_err(|e| CliError::ConfigLoad(format!("command line: {e}")))
}

fn write_output(path: &Path, content: &str) -> Result<(), CliError> {
    ensure_parent_dir(path)?;
    fs::write(path, content).map_err(|e| CliError::FileWrite {
        path: path.display().to_string(),
        source: e,
    })
}

/// Ensure the parent directory of a path exists
fn ensure_parent_dir(path: &Path) -> Result<(), CliError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        fs::create_dir_all(parent).map_err(|e| CliError::DirCreate {
            path: parent.display().to_string(),
            source: e,
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_publish_defaults() {
        let cli = Cli::parse_from(["todos", "publish"]);
        match cli.command {
            Commands::Publish {
                root,
                build,
                out,
                exclude,
                ..
            } => {
                assert_eq!(root, PathBuf::from("."));
                assert!(build.is_none());
                assert_eq!(out, PathBuf::from("artifacts/todos/report.json"));
                assert!(exclude.is_empty());
            }
            _ => panic!("unexpected command"),
        }
    }

    #[test]
    fn test_cli_compare_requires_current() {
        assert!(Cli::try_parse_from(["todos", "compare"]).is_err());
        assert!(
            Cli::try_parse_from(["todos", "compare", "--current", "a.xml", "--current", "b.xml"])
                .is_ok()
        );
    }

    #[test]
    fn test_cli_rejects_non_numeric_build() {
        assert!(Cli::try_parse_from(["todos", "publish", "--build", "abc"]).is_err());
    }

    #[test]
    fn test_explicit_missing_config_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = load_file_config(Some(&dir.path().join("missing.toml")));
        assert!(matches!(result, Err(CliError::ConfigLoad(_))));
    }

    #[test]
    fn test_run_publish_writes_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("ws");
        fs::create_dir_all(&root).unwrap();
        fs::write(
            root.join("todos.xml"),
            r#"<comments><comment pattern="TODO" file="a.rs" line="1">// TODO</comment></comments>"#,
        )
        .unwrap();

        let config = EffectiveConfig {
            history_dir: dir.path().join("history"),
            ..Default::default()
        };
        let out = dir.path().join("out/report.json");
        let md = dir.path().join("out/report.md");

        let code = run_publish(root, Some(1), config, &out, Some(&md)).unwrap();

        assert_eq!(code, EXIT_CODE_OK);
        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&out).unwrap()).unwrap();
        assert_eq!(json["schema"], "todos.report.v1");
        assert_eq!(json["build"], 1);
        assert!(fs::read_to_string(&md).unwrap().contains("## todos: Comment Report"));
        assert!(dir.path().join("history/1/todos-plugin/todos.xml").exists());
    }

    #[test]
    fn test_ensure_parent_dir_creates_nested() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a/b/c.json");
        ensure_parent_dir(&path).unwrap();
        assert!(dir.path().join("a/b").is_dir());
    }
}
