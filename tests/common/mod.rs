#![allow(unused_imports)]
//! Shared test utilities for integration tests.
//!
//! # Modules
//!
//! - `fixtures`: fixture paths, scratch scripts and a ready backend
//! - `assertions`: verdict and diff assertions with readable failures

pub mod assertions;
pub mod fixtures;

pub use assertions::{assert_diff_for_task, assert_verdict};
pub use fixtures::{fixture_path, reference_vm, scripts_dir, write_script};
