//! Harness settings.
//!
//! Layering, lowest to highest: [`HarnessConfig::default`], the YAML file given
//! with `--config`, environment variables, then CLI flags.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use txn_harness_types::env_utils::{
    env_var, read_env_update_baseline, HARNESS_JOBS, HARNESS_SCRIPT_TIMEOUT_MS,
    HARNESS_TASK_TIMEOUT_MS,
};
use txn_harness_types::DEFAULT_GAS_BUDGET;

use crate::args::{Args, OnFailure};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HarnessConfig {
    /// Script extensions picked up when walking directories.
    pub extensions: Vec<String>,
    /// Extension of the golden file next to each script.
    pub baseline_extension: String,
    pub update_baseline: bool,
    /// Fail a script whose baseline is missing.
    pub require_baseline: bool,
    pub on_failure: OnFailure,
    /// `0` lets rayon pick.
    pub jobs: usize,
    pub task_timeout_ms: Option<u64>,
    pub script_timeout_ms: Option<u64>,
    pub default_gas_budget: u64,
    pub filter: Option<String>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            extensions: vec!["move".to_string()],
            baseline_extension: "exp".to_string(),
            update_baseline: false,
            require_baseline: false,
            on_failure: OnFailure::Continue,
            jobs: 0,
            task_timeout_ms: None,
            script_timeout_ms: None,
            default_gas_budget: DEFAULT_GAS_BUDGET,
            filter: None,
        }
    }
}

impl HarnessConfig {
    pub fn from_yaml(raw: &str) -> Result<Self> {
        serde_yaml::from_str(raw).context("Invalid harness config YAML")
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        serde_yaml::from_str(&raw)
            .with_context(|| format!("Invalid harness config YAML in {}", path.display()))
    }

    pub fn apply_env(&mut self) {
        if read_env_update_baseline() {
            self.update_baseline = true;
        }
        if let Some(jobs) = env_var(HARNESS_JOBS) {
            self.jobs = jobs;
        }
        if let Some(ms) = env_var(HARNESS_TASK_TIMEOUT_MS) {
            self.task_timeout_ms = Some(ms);
        }
        if let Some(ms) = env_var(HARNESS_SCRIPT_TIMEOUT_MS) {
            self.script_timeout_ms = Some(ms);
        }
    }

    pub fn apply_args(&mut self, args: &Args) {
        if args.update_baseline {
            self.update_baseline = true;
        }
        if let Some(jobs) = args.jobs {
            self.jobs = jobs;
        }
        if let Some(policy) = args.on_failure {
            self.on_failure = policy;
        }
        if let Some(ms) = args.task_timeout_ms {
            self.task_timeout_ms = Some(ms);
        }
        if let Some(ms) = args.script_timeout_ms {
            self.script_timeout_ms = Some(ms);
        }
        if let Some(filter) = &args.filter {
            self.filter = Some(filter.clone());
        }
    }

    /// Build the effective configuration for a CLI invocation.
    pub fn resolve(args: &Args) -> Result<Self> {
        let mut config = match &args.config {
            Some(path) => Self::load_from_path(path)?,
            None => Self::default(),
        };
        config.apply_env();
        config.apply_args(args);
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.extensions.is_empty() {
            anyhow::bail!("at least one script extension is required");
        }
        if self.baseline_extension.is_empty() {
            anyhow::bail!("baseline_extension must not be empty");
        }
        if self.extensions.contains(&self.baseline_extension) {
            anyhow::bail!(
                "baseline_extension '{}' is also a script extension",
                self.baseline_extension
            );
        }
        if self.default_gas_budget == 0 {
            anyhow::bail!("default_gas_budget must be positive");
        }
        if let Some(filter) = &self.filter {
            regex::Regex::new(filter)
                .with_context(|| format!("Invalid --filter pattern '{}'", filter))?;
        }
        Ok(())
    }
}
