//! Runs every `tests/scripts/**/*.move` fixture and requires a pass: inline
//! expectations hold and the output matches the `.exp` baseline when present.
//!
//! Set `UPDATE_BASELINE=1` (or `UB=1`) to rewrite the baselines.

use std::path::Path;

use move_txn_harness::config::HarnessConfig;
use move_txn_harness::runner::{run_script, ScriptVerdict};
use txn_harness_vm::ReferenceVm;

fn run_fixture(path: &Path) -> datatest_stable::Result<()> {
    let mut config = HarnessConfig::default();
    config.apply_env();
    let vm = ReferenceVm::new()?;
    let report = run_script(&vm, path, &config);
    if report.verdict == ScriptVerdict::Pass {
        return Ok(());
    }

    let mut message = format!("{} did not pass ({:?})", path.display(), report.verdict);
    if let Some(error) = &report.error {
        message.push_str(&format!("\n{}", error));
    }
    for diff in &report.diffs {
        message.push_str(&format!("\n{}", diff));
    }
    message.push_str(&format!("\n\noutput:\n{}", report.output));
    Err(message.into())
}

datatest_stable::harness!(run_fixture, "tests/scripts", r".*\.move$");
