//! move-txn-harness: run transactional test scripts against the reference VM.
//!
//! ## Example Usage
//!
//! ```bash
//! # Run every script under a directory
//! move-txn-harness tests/scripts
//!
//! # Only string tests, four workers, stop a script at its first failed task
//! move-txn-harness tests/scripts --filter string --jobs 4 --on-failure halt
//!
//! # Regenerate golden files
//! UB=1 move-txn-harness tests/scripts
//! ```
//!
//! Exit status: `0` all scripts pass, `1` some script failed its comparison,
//! `2` a script could not be parsed or executed, or the run itself failed.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use move_txn_harness::args::Args;
use move_txn_harness::config::HarnessConfig;
use move_txn_harness::runner::{discover, run_scripts};
use txn_harness_vm::ReferenceVm;

fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.verbose);

    match run(&args) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::from(2)
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(args: &Args) -> Result<u8> {
    let config = HarnessConfig::resolve(args)?;
    let paths = if args.paths.is_empty() {
        vec![PathBuf::from(".")]
    } else {
        args.paths.clone()
    };

    let scripts = discover(&paths, &config)?;
    if scripts.is_empty() {
        println!("no scripts found");
    }

    let backend = ReferenceVm::new().context("Failed to initialize the reference VM")?;
    let summary = run_scripts(&backend, &scripts, &config)?;
    print!("{}", summary.render());

    if let Some(path) = &args.report_json {
        summary.write_json(path)?;
    }
    Ok(summary.exit_code() as u8)
}
