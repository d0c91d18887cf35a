use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

fn harness() -> Command {
    #[allow(deprecated)]
    Command::cargo_bin("move-txn-harness").unwrap()
}

fn manifest_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
}

#[test]
fn test_script_suite_passes() {
    harness()
        .arg(manifest_dir().join("tests/scripts"))
        .env_remove("UB")
        .env_remove("UPDATE_BASELINE")
        .assert()
        .success()
        .stdout(predicate::str::contains("test result: ok."))
        .stdout(predicate::str::contains("PASS"));
}

#[test]
fn test_comparison_failure_exits_one() {
    harness()
        .arg(manifest_dir().join("tests/fixtures/unexpected_success.move"))
        .assert()
        .code(1)
        .stdout(predicate::str::contains("FAIL"))
        .stdout(predicate::str::contains("expected abort(1), got success"));
}

#[test]
fn test_script_error_exits_two() {
    harness()
        .arg(manifest_dir().join("tests/fixtures/missing_init.move"))
        .assert()
        .code(2)
        .stdout(predicate::str::contains("ERROR"));
}

#[test]
fn test_missing_path_exits_two() {
    harness()
        .arg("/definitely/not/a/script/dir")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("no such file or directory"));
}

#[test]
fn test_filter_selects_scripts() {
    harness()
        .arg(manifest_dir().join("tests/scripts"))
        .args(["--filter", "sub_string"])
        .assert()
        .success()
        .stdout(predicate::str::contains("sub_string.move"))
        .stdout(predicate::str::contains("counter.move").not());
}

#[test]
fn test_report_json() {
    let dir = TempDir::new().unwrap();
    let report = dir.path().join("report.json");
    harness()
        .arg(manifest_dir().join("tests/fixtures/unexpected_success.move"))
        .arg("--report-json")
        .arg(&report)
        .assert()
        .code(1);

    let json: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&report).unwrap()).unwrap();
    assert!(json["generated_at"].is_string());
    assert_eq!(json["failed"], 1);
    assert_eq!(json["scripts"][0]["verdict"], "fail");
    assert_eq!(json["scripts"][0]["diffs"][0]["task"], 2);
    assert_eq!(json["scripts"][0]["diffs"][0]["source"], "expectation");
}

#[test]
fn test_update_baseline_writes_golden_file() {
    let dir = TempDir::new().unwrap();
    let script = dir.path().join("answer.move");
    fs::write(
        &script,
        "//# init --addresses A=0x42\n\n//# publish\nmodule A::M {\n    public fun answer(): u64 { 42 }\n}\n\n//# run -- A::M::answer\n",
    )
    .unwrap();

    harness()
        .arg(dir.path())
        .arg("--update-baseline")
        .assert()
        .success()
        .stdout(predicate::str::contains("baseline updated"));

    let baseline = fs::read_to_string(dir.path().join("answer.exp")).unwrap();
    assert_eq!(
        baseline,
        "processed 3 tasks\n\ntask 2 'run'. lines 8-8:\nreturn values: 42\n"
    );

    harness().arg(dir.path()).env_remove("UB").env_remove("UPDATE_BASELINE").assert().success();
}

#[test]
fn test_config_file_and_flag_precedence() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("harness.yaml");
    fs::write(&config, "filter: counter\n").unwrap();

    harness()
        .arg(manifest_dir().join("tests/scripts"))
        .arg("--config")
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("counter.move"))
        .stdout(predicate::str::contains("sub_string.move").not());

    harness()
        .arg(manifest_dir().join("tests/scripts"))
        .arg("--config")
        .arg(&config)
        .args(["--filter", "signer_capability"])
        .assert()
        .success()
        .stdout(predicate::str::contains("signer_capability.move"))
        .stdout(predicate::str::contains("counter.move").not());
}

#[test]
fn test_invalid_policy_is_a_usage_error() {
    harness()
        .args(["--on-failure", "explode"])
        .assert()
        .code(2);
}
