//! Outcome recording and comparison.
//!
//! [`Recorder`] renders a script's outcomes into the text stored in golden
//! baselines:
//!
//! ```text
//! processed 3 tasks
//!
//! task 2 'run'. lines 9-9:
//! return values: 42
//! ```
//!
//! Tasks whose outcome renders to nothing (a plain success) get no block.
//! Comparison produces [`TaskDiff`]s from two sources: each task's inline
//! expectation, and the baseline text.

use std::collections::BTreeMap;

use serde::Serialize;
use txn_harness_types::Outcome;

use crate::annotations::Expectation;
use crate::tasks::Task;

#[derive(Debug, Clone)]
pub struct TaskRecord {
    pub number: usize,
    pub name: String,
    pub start_line: usize,
    pub stop_line: usize,
    pub outcome: Outcome,
    pub expectation: Expectation,
}

impl TaskRecord {
    pub fn passed(&self) -> bool {
        self.expectation.matches(&self.outcome)
    }

    fn header(&self) -> String {
        format!(
            "task {} '{}'. lines {}-{}:",
            self.number, self.name, self.start_line, self.stop_line
        )
    }
}

/// Where a mismatch was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffSource {
    Expectation,
    Baseline,
}

/// One mismatch, expected vs actual.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskDiff {
    /// `None` for differences outside any task block (header, missing file).
    pub task: Option<usize>,
    pub source: DiffSource,
    pub expected: String,
    pub actual: String,
}

impl std::fmt::Display for TaskDiff {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.task {
            Some(n) => write!(f, "task {}: ", n)?,
            None => write!(f, "script: ")?,
        }
        match self.source {
            DiffSource::Expectation => {
                write!(f, "expected {}, got {}", self.expected, self.actual)
            }
            DiffSource::Baseline => write!(
                f,
                "baseline mismatch\n--- expected\n{}\n+++ actual\n{}",
                indent(&self.expected),
                indent(&self.actual)
            ),
        }
    }
}

fn indent(text: &str) -> String {
    text.lines()
        .map(|l| format!("    {}", l))
        .collect::<Vec<_>>()
        .join("\n")
}

#[derive(Debug, Default)]
pub struct Recorder {
    records: Vec<TaskRecord>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, task: &Task, outcome: Outcome, expectation: Expectation) -> &TaskRecord {
        let index = self.records.len();
        self.records.push(TaskRecord {
            number: task.number,
            name: task.name.clone(),
            start_line: task.start_line,
            stop_line: task.stop_line,
            outcome,
            expectation,
        });
        &self.records[index]
    }

    pub fn records(&self) -> &[TaskRecord] {
        &self.records
    }

    /// Canonical text for the baseline.
    pub fn render(&self) -> String {
        let mut out = format!("processed {} tasks\n", self.records.len());
        for record in &self.records {
            if let Some(text) = record.outcome.render() {
                out.push('\n');
                out.push_str(&record.header());
                out.push('\n');
                out.push_str(&text);
                out.push('\n');
            }
        }
        out
    }

    /// Tasks whose outcome does not meet their inline expectation.
    pub fn expectation_diffs(&self) -> Vec<TaskDiff> {
        self.records
            .iter()
            .filter(|r| !r.passed())
            .map(|r| TaskDiff {
                task: Some(r.number),
                source: DiffSource::Expectation,
                expected: r.expectation.to_string(),
                actual: match r.outcome.render() {
                    Some(text) => format!("{} ({})", r.outcome.label(), text),
                    None => r.outcome.label(),
                },
            })
            .collect()
    }
}

// =============================================================================
// Baseline comparison
// =============================================================================

const HEADER_KEY: usize = usize::MAX;

/// Split rendered output into blocks keyed by task number.
fn blocks(text: &str) -> BTreeMap<usize, String> {
    let mut blocks: BTreeMap<usize, Vec<&str>> = BTreeMap::new();
    let mut current = HEADER_KEY;
    for line in text.lines() {
        if let Some(n) = task_number(line) {
            current = n;
        }
        blocks.entry(current).or_default().push(line);
    }
    blocks
        .into_iter()
        .map(|(k, lines)| (k, lines.join("\n").trim().to_string()))
        .collect()
}

fn task_number(line: &str) -> Option<usize> {
    let rest = line.strip_prefix("task ")?;
    let (n, tail) = rest.split_once(' ')?;
    if !tail.starts_with('\'') || !line.ends_with(':') {
        return None;
    }
    n.parse().ok()
}

fn normalize(text: &str) -> String {
    text.replace("\r\n", "\n").trim_end().to_string()
}

/// Per-task differences between a baseline and freshly rendered output.
pub fn compare_baseline(expected: &str, actual: &str) -> Vec<TaskDiff> {
    let (expected, actual) = (normalize(expected), normalize(actual));
    if expected == actual {
        return Vec::new();
    }

    let (expected_blocks, actual_blocks) = (blocks(&expected), blocks(&actual));
    let mut keys: Vec<usize> = expected_blocks
        .keys()
        .chain(actual_blocks.keys())
        .copied()
        .collect();
    keys.sort_unstable();
    keys.dedup();

    let mut diffs = Vec::new();
    for key in keys {
        let e = expected_blocks.get(&key).map(String::as_str).unwrap_or("<none>");
        let a = actual_blocks.get(&key).map(String::as_str).unwrap_or("<none>");
        if e != a {
            diffs.push(TaskDiff {
                task: (key != HEADER_KEY).then_some(key),
                source: DiffSource::Baseline,
                expected: e.to_string(),
                actual: a.to_string(),
            });
        }
    }
    if diffs.is_empty() {
        // Only whitespace between blocks differs.
        diffs.push(TaskDiff {
            task: None,
            source: DiffSource::Baseline,
            expected,
            actual,
        });
    }
    diffs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::parse_script;
    use std::path::Path;
    use txn_harness_types::{ErrorKind, MoveValue, SuccessValue};

    fn tasks() -> Vec<Task> {
        parse_script(
            Path::new("t.move"),
            "//# init\n\n//# run -- 0x1::M::f\n\n//# run -- 0x1::M::g\n",
        )
        .unwrap()
        .tasks
    }

    fn recorder() -> Recorder {
        let tasks = tasks();
        let mut r = Recorder::new();
        r.record(&tasks[0], Outcome::unit(), Expectation::Success);
        r.record(
            &tasks[1],
            Outcome::Success(SuccessValue::Returned(vec![MoveValue::string("cd")])),
            Expectation::Success,
        );
        r.record(
            &tasks[2],
            Outcome::abort(7, Some("0x42::M".to_string())),
            Expectation::Abort(7),
        );
        r
    }

    #[test]
    fn test_render() {
        assert_eq!(
            recorder().render(),
            "processed 3 tasks\n\
             \n\
             task 1 'run'. lines 3-3:\n\
             return values: \"cd\"\n\
             \n\
             task 2 'run'. lines 5-5:\n\
             aborted with code 7 in 0x42::M\n"
        );
    }

    #[test]
    fn test_expectations_pass() {
        assert!(recorder().expectation_diffs().is_empty());
    }

    #[test]
    fn test_unexpected_abort_is_reported() {
        let tasks = tasks();
        let mut r = Recorder::new();
        r.record(&tasks[1], Outcome::abort(3, None), Expectation::Success);
        r.record(
            &tasks[2],
            Outcome::error(ErrorKind::Arithmetic, "overflow"),
            Expectation::Abort(7),
        );
        let diffs = r.expectation_diffs();
        assert_eq!(diffs.len(), 2);
        assert_eq!(
            diffs[0].to_string(),
            "task 1: expected success, got abort(3) (aborted with code 3)"
        );
        assert_eq!(diffs[1].expected, "abort(7)");
    }

    #[test]
    fn test_baseline_match_ignores_trailing_whitespace() {
        let actual = recorder().render();
        assert!(compare_baseline(&format!("{}\n\n", actual), &actual).is_empty());
        assert!(compare_baseline(&actual.replace('\n', "\r\n"), &actual).is_empty());
    }

    #[test]
    fn test_baseline_diff_is_per_task() {
        let actual = recorder().render();
        let expected = actual.replace("\"cd\"", "\"ab\"");
        let diffs = compare_baseline(&expected, &actual);
        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].task, Some(1));
        assert!(diffs[0].expected.ends_with("return values: \"ab\""));
        assert!(diffs[0].actual.ends_with("return values: \"cd\""));
    }

    #[test]
    fn test_baseline_missing_task_block() {
        let actual = recorder().render();
        let expected = "processed 3 tasks\n\ntask 1 'run'. lines 3-3:\nreturn values: \"cd\"\n";
        let diffs = compare_baseline(expected, &actual);
        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].task, Some(2));
        assert_eq!(diffs[0].expected, "<none>");
    }

    #[test]
    fn test_header_difference() {
        let actual = recorder().render();
        let expected = actual.replace("processed 3 tasks", "processed 4 tasks");
        let diffs = compare_baseline(&expected, &actual);
        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].task, None);
    }
}
