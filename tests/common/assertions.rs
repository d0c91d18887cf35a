//! Custom assertion utilities for tests.

use move_txn_harness::recorder::DiffSource;
use move_txn_harness::runner::{ScriptReport, ScriptVerdict};

/// Assert a script's verdict, printing its diffs and error on mismatch.
#[allow(dead_code)]
pub fn assert_verdict(report: &ScriptReport, expected: ScriptVerdict) {
    if report.verdict != expected {
        let diffs: Vec<String> = report.diffs.iter().map(|d| d.to_string()).collect();
        panic!(
            "{}: expected {:?}, got {:?}\nerror: {:?}\ndiffs:\n{}\noutput:\n{}",
            report.path.display(),
            expected,
            report.verdict,
            report.error,
            diffs.join("\n"),
            report.output
        );
    }
}

/// Assert that `report` has a diff of `source` for task `task`.
#[allow(dead_code)]
pub fn assert_diff_for_task(report: &ScriptReport, task: usize, source: DiffSource) {
    assert!(
        report
            .diffs
            .iter()
            .any(|d| d.task == Some(task) && d.source == source),
        "expected a {:?} diff for task {} in {:?}",
        source,
        task,
        report.diffs
    );
}
