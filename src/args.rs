use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnFailure {
    /// Keep running the script's remaining tasks.
    #[default]
    Continue,
    /// Stop the script at the first task that does not pass.
    Halt,
}

#[derive(Debug, Default, Parser)]
#[command(author, version, about)]
pub struct Args {
    /// Scripts or directories to search for scripts. Defaults to the current directory.
    #[arg(value_name = "PATHS")]
    pub paths: Vec<PathBuf>,

    /// Only run scripts whose path matches this regex.
    #[arg(long, value_name = "PATTERN")]
    pub filter: Option<String>,

    /// Rewrite golden baselines instead of comparing against them.
    #[arg(long, default_value_t = false)]
    pub update_baseline: bool,

    /// Worker threads for running scripts (`0` = one per core).
    #[arg(long, value_name = "N")]
    pub jobs: Option<usize>,

    /// YAML file with harness settings; flags given here take precedence.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// What to do with the rest of a script after a task does not pass.
    #[arg(long, value_enum)]
    pub on_failure: Option<OnFailure>,

    /// Wall-clock budget per task, in milliseconds.
    #[arg(long, value_name = "N")]
    pub task_timeout_ms: Option<u64>,

    /// Wall-clock budget per script, in milliseconds.
    #[arg(long, value_name = "N")]
    pub script_timeout_ms: Option<u64>,

    /// Write a JSON summary of the run to this file.
    #[arg(long, value_name = "FILE")]
    pub report_json: Option<PathBuf>,

    /// Log task-level detail (same as RUST_LOG=debug when RUST_LOG is unset).
    #[arg(long, short, default_value_t = false)]
    pub verbose: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flags() {
        let args = Args::parse_from([
            "move-txn-harness",
            "tests/scripts",
            "--filter",
            "string",
            "--jobs",
            "4",
            "--on-failure",
            "halt",
            "--update-baseline",
        ]);
        assert_eq!(args.paths, vec![PathBuf::from("tests/scripts")]);
        assert_eq!(args.filter.as_deref(), Some("string"));
        assert_eq!(args.jobs, Some(4));
        assert_eq!(args.on_failure, Some(OnFailure::Halt));
        assert!(args.update_baseline);
        assert!(args.config.is_none());
    }

    #[test]
    fn test_rejects_unknown_policy() {
        assert!(Args::try_parse_from(["move-txn-harness", "--on-failure", "panic"]).is_err());
    }
}
