//! BDD/Cucumber test harness for todos.
//!
//! Step definitions for the Gherkin feature files in `bdd/features/`.
//! Every scenario works on a fresh temporary workspace and history
//! directory, using the real filesystem and XML adapters.
//!
//! Run with: `cargo test --test bdd`

use std::path::PathBuf;

use cucumber::gherkin::Step;
use cucumber::{World, given, then, when};
use todos_app::{PublishRequest, PublishResult, publish, trend};
use todos_config::EffectiveConfig;
use todos_types::DiffStatus;

/// The world state for BDD tests.
#[derive(Debug, Default, World)]
pub struct TodosWorld {
    /// Holds the workspace and history directories.
    dir: Option<tempfile::TempDir>,
    /// Configuration applied to every publish.
    config: EffectiveConfig,
    /// Result of the last publish.
    result: Option<PublishResult>,
    /// Error of the last publish, if it failed.
    error: Option<String>,
}

impl TodosWorld {
    fn base(&mut self) -> PathBuf {
        if self.dir.is_none() {
            self.dir = Some(tempfile::tempdir().expect("create temp dir"));
        }
        let base = self.dir.as_ref().expect("temp dir").path().to_path_buf();
        self.config.history_dir = base.join("history");
        base
    }

    fn workspace(&mut self) -> PathBuf {
        self.base().join("ws")
    }

    fn run_publish(&mut self, build: Option<u64>) {
        let request = PublishRequest {
            root: self.workspace(),
            build,
            config: self.config.clone(),
        };
        std::fs::create_dir_all(&request.root).expect("create workspace");
        match publish(&request) {
            Ok(result) => {
                self.result = Some(result);
                self.error = None;
            }
            Err(err) => {
                self.result = None;
                self.error = Some(err.to_string());
            }
        }
    }

    fn result(&self) -> &PublishResult {
        self.result.as_ref().expect("publish should have succeeded")
    }
}

// ============================================================================
// Given
// ============================================================================

#[given(expr = "the report {string} contains:")]
fn report_contains(world: &mut TodosWorld, path: String, step: &Step) {
    let target = world.workspace().join(path);
    std::fs::create_dir_all(target.parent().expect("parent dir")).expect("create dirs");
    let content = step.docstring.as_deref().expect("docstring with XML");
    std::fs::write(target, content.trim_start()).expect("write report");
}

#[given(expr = "the report {string} is removed")]
fn report_removed(world: &mut TodosWorld, path: String) {
    std::fs::remove_file(world.workspace().join(path)).expect("remove report");
}

#[given(expr = "reports under {string} are excluded")]
fn exclude_reports(world: &mut TodosWorld, pattern: String) {
    world.config.exclude_patterns.push(pattern);
}

#[given(expr = "build {int} was published")]
fn build_was_published(world: &mut TodosWorld, build: u64) {
    world.run_publish(Some(build));
    assert!(world.error.is_none(), "setup publish failed: {:?}", world.error);
}

// ============================================================================
// When
// ============================================================================

#[when(expr = "build {int} is published")]
fn build_is_published(world: &mut TodosWorld, build: u64) {
    world.run_publish(Some(build));
}

#[when("the reports are published without a build number")]
fn published_without_build(world: &mut TodosWorld) {
    world.run_publish(None);
}

// ============================================================================
// Then
// ============================================================================

#[then(expr = "the summary starts with {string}")]
fn summary_starts_with(world: &mut TodosWorld, expected: String) {
    let summary = &world.result().summary;
    assert!(
        summary.starts_with(&expected),
        "summary was:\n{summary}"
    );
}

#[then(regex = r"^(\d+) comments? (?:is|are) (new|solved|unchanged)$")]
fn comments_with_status(world: &mut TodosWorld, count: usize, status: String) {
    let status = match status.as_str() {
        "new" => DiffStatus::New,
        "solved" => DiffStatus::Solved,
        _ => DiffStatus::Unchanged,
    };
    assert_eq!(world.result().diffed.count_with_status(status), count);
}

#[then("no comment has a status")]
fn no_status(world: &mut TodosWorld) {
    let result = world.result();
    assert!(result.diffed.comments().iter().all(|c| c.diff_status.is_none()));
    assert!(result.report.diff.is_none());
}

#[then(expr = "the previous build is {int}")]
fn previous_build_is(world: &mut TodosWorld, build: u64) {
    assert_eq!(world.result().report.previous_build, Some(build));
}

#[then(expr = "the inputs are {string}")]
fn inputs_are(world: &mut TodosWorld, inputs: String) {
    let expected: Vec<String> = inputs.split(", ").map(str::to_string).collect();
    assert_eq!(world.result().report.inputs, expected);
}

#[then(expr = "the publish fails mentioning {string}")]
fn publish_fails(world: &mut TodosWorld, needle: String) {
    let error = world.error.as_deref().expect("publish should have failed");
    assert!(error.contains(&needle), "error was: {error}");
}

#[then(expr = "build {int} has no archive")]
fn build_has_no_archive(world: &mut TodosWorld, build: u64) {
    let dir = world.base().join("history").join(build.to_string());
    assert!(!dir.exists());
}

#[then(expr = "the trend over {int} builds covers builds {string}")]
fn trend_covers(world: &mut TodosWorld, builds: usize, expected: String) {
    let history = world.base().join("history");
    let result = trend(&history, builds);
    let got: Vec<String> = result.report.points.iter().map(|p| p.build.to_string()).collect();
    assert_eq!(got.join(", "), expected);
}

#[then(expr = "the markdown contains {string}")]
fn markdown_contains(world: &mut TodosWorld, needle: String) {
    let markdown = &world.result().markdown;
    assert!(markdown.contains(&needle), "markdown was:\n{markdown}");
}

// ============================================================================
// Main Entry Point
// ============================================================================

fn main() {
    futures::executor::block_on(TodosWorld::cucumber().run("../../bdd/features"));
}
