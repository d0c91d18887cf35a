//! Script runner.
//!
//! Discovers scripts, runs each one through parse → execute → record →
//! compare on a bounded rayon pool, and aggregates the verdicts.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use rayon::prelude::*;
use regex::Regex;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};
use txn_harness_types::{Backend, ErrorKind, Outcome};

use crate::args::OnFailure;
use crate::config::HarnessConfig;
use crate::errors::ScriptError;
use crate::executor::TaskExecutor;
use crate::recorder::{compare_baseline, DiffSource, Recorder, TaskDiff};
use crate::tasks::parse_script;

/// Interpreting deeply nested calls recurses on the native stack.
pub const WORKER_STACK_SIZE: usize = 16 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptVerdict {
    Pass,
    Fail,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScriptReport {
    pub path: PathBuf,
    pub verdict: ScriptVerdict,
    pub tasks_run: usize,
    pub diffs: Vec<TaskDiff>,
    pub error: Option<String>,
    pub baseline_updated: bool,
    pub duration_ms: u64,
    /// Rendered output, as written to the baseline.
    #[serde(skip)]
    pub output: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub generated_at: DateTime<Utc>,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub errored: usize,
    pub scripts: Vec<ScriptReport>,
}

impl RunSummary {
    pub fn from_reports(scripts: Vec<ScriptReport>) -> Self {
        let count = |v: ScriptVerdict| scripts.iter().filter(|s| s.verdict == v).count();
        Self {
            generated_at: Utc::now(),
            total: scripts.len(),
            passed: count(ScriptVerdict::Pass),
            failed: count(ScriptVerdict::Fail),
            errored: count(ScriptVerdict::Error),
            scripts,
        }
    }

    /// `0` all pass, `1` some script failed its comparison, `2` a harness error.
    pub fn exit_code(&self) -> i32 {
        if self.errored > 0 {
            2
        } else if self.failed > 0 {
            1
        } else {
            0
        }
    }

    /// Human-readable summary for stdout.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for script in &self.scripts {
            let label = match script.verdict {
                ScriptVerdict::Pass => "PASS",
                ScriptVerdict::Fail => "FAIL",
                ScriptVerdict::Error => "ERROR",
            };
            out.push_str(&format!("{} {}", label, script.path.display()));
            if script.baseline_updated {
                out.push_str(" (baseline updated)");
            }
            out.push('\n');
            if let Some(error) = &script.error {
                out.push_str(&format!("    {}\n", error));
            }
            for diff in &script.diffs {
                for line in diff.to_string().lines() {
                    out.push_str(&format!("    {}\n", line));
                }
            }
        }
        let status = if self.exit_code() == 0 { "ok" } else { "FAILED" };
        out.push_str(&format!(
            "\ntest result: {}. {} passed; {} failed; {} errored\n",
            status, self.passed, self.failed, self.errored
        ));
        out
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("Failed to serialize run summary")?;
        fs::write(path, json)
            .with_context(|| format!("Failed to write JSON report {}", path.display()))
    }
}

// =============================================================================
// Discovery
// =============================================================================

/// Scripts under `paths`, sorted. Files given directly are always included;
/// directories are walked for the configured extensions.
pub fn discover(paths: &[PathBuf], config: &HarnessConfig) -> Result<Vec<PathBuf>> {
    let filter = config
        .filter
        .as_deref()
        .map(Regex::new)
        .transpose()
        .context("Invalid script filter")?;

    let mut found = Vec::new();
    for path in paths {
        if path.is_file() {
            found.push(path.clone());
        } else if path.is_dir() {
            walk(path, &config.extensions, &mut found)?;
        } else {
            return Err(anyhow!("no such file or directory: {}", path.display()));
        }
    }

    if let Some(re) = filter {
        found.retain(|p| re.is_match(&p.to_string_lossy()));
    }
    found.sort();
    found.dedup();
    Ok(found)
}

fn walk(dir: &Path, extensions: &[String], found: &mut Vec<PathBuf>) -> Result<()> {
    let entries =
        fs::read_dir(dir).with_context(|| format!("Failed to read directory {}", dir.display()))?;
    for entry in entries {
        let path = entry
            .with_context(|| format!("Failed to read directory {}", dir.display()))?
            .path();
        if path.is_dir() {
            walk(&path, extensions, found)?;
        } else if path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| extensions.iter().any(|x| x == e))
        {
            found.push(path);
        }
    }
    Ok(())
}

// =============================================================================
// Running
// =============================================================================

/// Run every script on a pool of `config.jobs` workers. Reports keep the
/// order of `scripts`.
pub fn run_scripts<B: Backend>(
    backend: &B,
    scripts: &[PathBuf],
    config: &HarnessConfig,
) -> Result<RunSummary> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.jobs)
        .stack_size(WORKER_STACK_SIZE)
        .thread_name(|i| format!("harness-worker-{}", i))
        .build()
        .context("Failed to build worker pool")?;

    let reports: Vec<ScriptReport> = pool.install(|| {
        scripts
            .par_iter()
            .map(|path| run_script(backend, path, config))
            .collect()
    });
    Ok(RunSummary::from_reports(reports))
}

/// Run one script against fresh state and compare its output.
pub fn run_script<B: Backend>(backend: &B, path: &Path, config: &HarnessConfig) -> ScriptReport {
    let started = Instant::now();
    let (output, tasks_run, mut diffs, error) = match fs::read_to_string(path) {
        Ok(text) => execute_script(backend, path, &text, config),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to read script");
            let error = ScriptError::Io {
                path: path.to_path_buf(),
                message: e.to_string(),
            };
            (String::new(), 0, Vec::new(), Some(error))
        }
    };

    let mut baseline_updated = false;
    if error.is_none() {
        let baseline = path.with_extension(&config.baseline_extension);
        if config.update_baseline {
            match fs::write(&baseline, &output) {
                Ok(()) => baseline_updated = true,
                Err(e) => {
                    warn!(path = %baseline.display(), error = %e, "failed to write baseline");
                    return finish(
                        path,
                        started,
                        output,
                        tasks_run,
                        diffs,
                        Some(ScriptError::Io {
                            path: baseline,
                            message: e.to_string(),
                        }),
                        false,
                    );
                }
            }
        } else {
            match fs::read_to_string(&baseline) {
                Ok(expected) => diffs.extend(compare_baseline(&expected, &output)),
                Err(_) if !config.require_baseline => {
                    debug!(path = %baseline.display(), "no baseline; inline expectations only");
                }
                Err(e) => diffs.push(TaskDiff {
                    task: None,
                    source: DiffSource::Baseline,
                    expected: format!("baseline {}", baseline.display()),
                    actual: format!("<missing: {}>", e),
                }),
            }
        }
    }

    finish(
        path,
        started,
        output,
        tasks_run,
        diffs,
        error,
        baseline_updated,
    )
}

fn finish(
    path: &Path,
    started: Instant,
    output: String,
    tasks_run: usize,
    diffs: Vec<TaskDiff>,
    error: Option<ScriptError>,
    baseline_updated: bool,
) -> ScriptReport {
    let verdict = if error.is_some() {
        ScriptVerdict::Error
    } else if !diffs.is_empty() {
        ScriptVerdict::Fail
    } else {
        ScriptVerdict::Pass
    };
    info!(path = %path.display(), ?verdict, tasks = tasks_run, "script finished");
    ScriptReport {
        path: path.to_path_buf(),
        verdict,
        tasks_run,
        diffs,
        error: error.map(|e| e.to_string()),
        baseline_updated,
        duration_ms: elapsed_ms(started),
        output,
    }
}

/// Returns the rendered output, tasks run, inline diffs and any script error.
fn execute_script<B: Backend>(
    backend: &B,
    path: &Path,
    text: &str,
    config: &HarnessConfig,
) -> (String, usize, Vec<TaskDiff>, Option<ScriptError>) {
    let script = match parse_script(path, text) {
        Ok(script) => script,
        Err(e) => return (String::new(), 0, Vec::new(), Some(ScriptError::Parse(e))),
    };

    let started = Instant::now();
    let mut executor = TaskExecutor::new(backend, config.default_gas_budget);
    let mut recorder = Recorder::new();
    let mut error = None;

    for task in &script.tasks {
        if let Some(budget_ms) = config.script_timeout_ms {
            let elapsed_ms = elapsed_ms(started);
            if elapsed_ms >= budget_ms {
                error = Some(ScriptError::Timeout {
                    elapsed_ms,
                    budget_ms,
                });
                break;
            }
        }

        let task_started = Instant::now();
        let result = match executor.execute(task) {
            Ok(result) => result,
            Err(e) => {
                debug!(task = task.number, error = %e, "script stopped");
                error = Some(e);
                break;
            }
        };
        let outcome = match config.task_timeout_ms {
            Some(budget) if elapsed_ms(task_started) > budget => Outcome::error(
                ErrorKind::Timeout,
                format!("task exceeded its {} ms budget", budget),
            ),
            _ => result.outcome,
        };

        let passed = recorder.record(task, outcome, result.expectation).passed();
        if !passed && config.on_failure == OnFailure::Halt {
            debug!(task = task.number, "halting script after failed task");
            break;
        }
    }

    let tasks_run = recorder.records().len();
    (
        recorder.render(),
        tasks_run,
        recorder.expectation_diffs(),
        error,
    )
}

fn elapsed_ms(since: Instant) -> u64 {
    u64::try_from(since.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use txn_harness_vm::ReferenceVm;

    fn write(dir: &Path, name: &str, text: &str) -> PathBuf {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, text).unwrap();
        path
    }

    const ADD: &str = "\
//# init --addresses A=0x42

//# publish
module A::M {
    public fun add(a: u64, b: u64): u64 { a + b }
}

//# run --args 1 2 -- A::M::add
";

    #[test]
    fn test_discover_walks_and_filters() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.move", ADD);
        write(dir.path(), "nested/b.move", ADD);
        write(dir.path(), "nested/b.exp", "");
        write(dir.path(), "notes.txt", "");

        let config = HarnessConfig::default();
        let found = discover(&[dir.path().to_path_buf()], &config).unwrap();
        assert_eq!(found.len(), 2);
        assert!(found[0].ends_with("a.move"));

        let config = HarnessConfig {
            filter: Some("nested".to_string()),
            ..HarnessConfig::default()
        };
        let found = discover(&[dir.path().to_path_buf()], &config).unwrap();
        assert_eq!(found.len(), 1);
        assert!(found[0].ends_with("nested/b.move"));
    }

    #[test]
    fn test_discover_missing_path() {
        let config = HarnessConfig::default();
        assert!(discover(&[PathBuf::from("/definitely/not/here")], &config).is_err());
    }

    #[test]
    fn test_update_then_compare() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "add.move", ADD);
        let vm = ReferenceVm::new().unwrap();

        let update = HarnessConfig {
            update_baseline: true,
            ..HarnessConfig::default()
        };
        let report = run_script(&vm, &path, &update);
        assert_eq!(report.verdict, ScriptVerdict::Pass);
        assert!(report.baseline_updated);
        let baseline = fs::read_to_string(path.with_extension("exp")).unwrap();
        assert_eq!(
            baseline,
            "processed 3 tasks\n\ntask 2 'run'. lines 8-8:\nreturn values: 3\n"
        );

        let report = run_script(&vm, &path, &HarnessConfig::default());
        assert_eq!(report.verdict, ScriptVerdict::Pass, "{:?}", report.diffs);

        fs::write(path.with_extension("exp"), baseline.replace("3\n", "4\n")).unwrap();
        let report = run_script(&vm, &path, &HarnessConfig::default());
        assert_eq!(report.verdict, ScriptVerdict::Fail);
        assert_eq!(report.diffs[0].task, Some(2));
    }

    #[test]
    fn test_require_baseline() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "add.move", ADD);
        let vm = ReferenceVm::new().unwrap();
        let config = HarnessConfig {
            require_baseline: true,
            ..HarnessConfig::default()
        };
        assert_eq!(run_script(&vm, &path, &config).verdict, ScriptVerdict::Fail);
    }

    #[test]
    fn test_halt_policy_stops_after_failed_task() {
        let dir = tempfile::tempdir().unwrap();
        let text = format!("{}\n//# run --args 1 -- A::M::add\n\n//# run --args 5 6 -- A::M::add\n", ADD);
        let path = write(dir.path(), "halt.move", &text);
        let vm = ReferenceVm::new().unwrap();

        let report = run_script(&vm, &path, &HarnessConfig::default());
        assert_eq!(report.tasks_run, 5);
        assert_eq!(report.verdict, ScriptVerdict::Fail);

        let halt = HarnessConfig {
            on_failure: OnFailure::Halt,
            ..HarnessConfig::default()
        };
        let report = run_script(&vm, &path, &halt);
        assert_eq!(report.tasks_run, 4);
        assert_eq!(report.verdict, ScriptVerdict::Fail);
    }

    #[test]
    fn test_script_timeout_stops_remaining_tasks() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "add.move", ADD);
        let vm = ReferenceVm::new().unwrap();
        let config = HarnessConfig {
            script_timeout_ms: Some(0),
            ..HarnessConfig::default()
        };
        let report = run_script(&vm, &path, &config);
        assert_eq!(report.verdict, ScriptVerdict::Error);
        assert_eq!(report.tasks_run, 0);
        assert!(report.error.unwrap().contains("timed out"));
    }

    #[test]
    fn test_unreadable_script_is_an_error() {
        let vm = ReferenceVm::new().unwrap();
        let report = run_script(&vm, Path::new("/no/such/script.move"), &HarnessConfig::default());
        assert_eq!(report.verdict, ScriptVerdict::Error);
    }

    #[test]
    fn test_summary_exit_codes() {
        let report = |verdict| ScriptReport {
            path: PathBuf::from("x.move"),
            verdict,
            tasks_run: 0,
            diffs: Vec::new(),
            error: None,
            baseline_updated: false,
            duration_ms: 0,
            output: String::new(),
        };
        assert_eq!(RunSummary::from_reports(vec![report(ScriptVerdict::Pass)]).exit_code(), 0);
        let summary = RunSummary::from_reports(vec![
            report(ScriptVerdict::Pass),
            report(ScriptVerdict::Fail),
        ]);
        assert_eq!(summary.exit_code(), 1);
        assert!(summary.render().contains("1 passed; 1 failed; 0 errored"));
        let summary = RunSummary::from_reports(vec![
            report(ScriptVerdict::Fail),
            report(ScriptVerdict::Error),
        ]);
        assert_eq!(summary.exit_code(), 2);
    }
}
