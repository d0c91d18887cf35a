//! Environment variable parsing utilities.
//!
//! The harness reads a handful of overrides from the environment, layered on
//! top of the config file and below CLI flags:
//!
//! - [`UPDATE_BASELINE`] / [`UB`]: rewrite golden baselines instead of comparing
//! - [`HARNESS_JOBS`]: worker pool size
//! - [`HARNESS_TASK_TIMEOUT_MS`] / [`HARNESS_SCRIPT_TIMEOUT_MS`]: wall-clock budgets
//!
//! # Example
//!
//! ```
//! use txn_harness_types::env_utils::{env_var, env_bool};
//!
//! let timeout: Option<u64> = env_var("HARNESS_TIMEOUT_UNSET_IN_DOCTEST");
//! assert!(timeout.is_none());
//!
//! assert!(!env_bool("HARNESS_FLAG_UNSET_IN_DOCTEST"));
//! ```

use std::str::FromStr;

/// Rewrite baselines instead of comparing against them.
pub const UPDATE_BASELINE: &str = "UPDATE_BASELINE";
/// Short alias for [`UPDATE_BASELINE`].
pub const UB: &str = "UB";
/// Number of scripts to run concurrently.
pub const HARNESS_JOBS: &str = "HARNESS_JOBS";
/// Per-task wall-clock budget in milliseconds.
pub const HARNESS_TASK_TIMEOUT_MS: &str = "HARNESS_TASK_TIMEOUT_MS";
/// Per-script wall-clock budget in milliseconds.
pub const HARNESS_SCRIPT_TIMEOUT_MS: &str = "HARNESS_SCRIPT_TIMEOUT_MS";

/// Parse an environment variable into a type that implements `FromStr`.
///
/// Returns `None` if the variable is not set or cannot be parsed.
pub fn env_var<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// Check if an environment variable is set to a truthy value.
///
/// Returns `true` if the variable is set to "1", "true", "yes", or "on" (case-insensitive).
pub fn env_bool(key: &str) -> bool {
    std::env::var(key)
        .ok()
        .map(|v| is_truthy(&v))
        .unwrap_or(false)
}

/// Whether baseline update mode was requested through the environment.
pub fn read_env_update_baseline() -> bool {
    env_bool(UPDATE_BASELINE) || env_bool(UB)
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truthy_values() {
        for v in ["1", "true", "TRUE", "yes", "On", " on "] {
            assert!(is_truthy(v), "{v} should be truthy");
        }
        for v in ["0", "false", "", "no", "off", "2"] {
            assert!(!is_truthy(v), "{v} should not be truthy");
        }
    }

    #[test]
    fn test_unset_variables_use_defaults() {
        let key = "TXN_HARNESS_TEST_UNSET_VARIABLE";
        assert_eq!(env_var::<u64>(key), None);
        assert!(!env_bool(key));
    }
}
