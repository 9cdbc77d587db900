// Harness configuration for exediff
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::layout;
use crate::types::{ComparisonPolicy, IgnoreRules, TestCase};

pub const DEFAULT_CONFIG_PATH: &str = "config/harness.json";

pub const ENV_EXE_DIR: &str = "EXEDIFF_EXE_DIR";
pub const ENV_REFERENCE_DIR: &str = "EXEDIFF_REFERENCE_DIR";
pub const ENV_TIMEOUT_MS: &str = "EXEDIFF_TIMEOUT_MS";
pub const ENV_POLICY: &str = "EXEDIFF_POLICY";
pub const ENV_KEEP_OUTPUT: &str = "EXEDIFF_KEEP_OUTPUT";

/// Per-case adjustments layered over the naming convention
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseOverrides {
    /// Reference file name inside `reference_dir`, replacing `<stem>.<ext>`
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub ignore_files: Vec<String>,
    #[serde(default)]
    pub ignore_elements: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Directory holding the pre-built test executables; also their working directory
    pub exe_dir: PathBuf,
    pub reference_dir: PathBuf,
    pub output_extension: String,
    pub timeout_ms: u64,
    /// Explicit policy; derived from `output_extension` when absent
    pub policy: Option<ComparisonPolicy>,
    /// Leave produced artifacts on disk for inspection
    pub keep_output: bool,
    pub cases: BTreeMap<String, CaseOverrides>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            exe_dir: PathBuf::from("test/functional/src"),
            reference_dir: PathBuf::from("test/functional/xlsx_files"),
            output_extension: "xlsx".to_string(),
            timeout_ms: 60_000,
            policy: None,
            keep_output: false,
            cases: BTreeMap::new(),
        }
    }
}

impl HarnessConfig {
    /// Load configuration from a JSON file
    pub fn load(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            bail!("Harness config file not found: {}", config_path.display());
        }

        let content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read {}", config_path.display()))?;

        let config: HarnessConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", config_path.display()))?;

        config.validate()?;
        Ok(config)
    }

    /// Load `config/harness.json` when present, built-in defaults otherwise,
    /// then apply environment overrides
    pub fn load_default() -> Result<Self> {
        let default_path = Path::new(DEFAULT_CONFIG_PATH);
        let mut config = if default_path.exists() {
            Self::load(default_path)?
        } else {
            debug!(path = DEFAULT_CONFIG_PATH, "No harness config file, using defaults");
            Self::default()
        };
        config.apply_env()?;
        Ok(config)
    }

    /// Apply `EXEDIFF_*` environment overrides
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup(ENV_EXE_DIR) {
            self.exe_dir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup(ENV_REFERENCE_DIR) {
            self.reference_dir = PathBuf::from(dir);
        }
        if let Some(ms) = lookup(ENV_TIMEOUT_MS) {
            self.timeout_ms = ms
                .trim()
                .parse()
                .with_context(|| format!("Invalid {}: {}", ENV_TIMEOUT_MS, ms))?;
        }
        if let Some(policy) = lookup(ENV_POLICY) {
            self.policy = Some(policy.parse().map_err(anyhow::Error::msg)?);
        }
        if let Some(keep) = lookup(ENV_KEEP_OUTPUT) {
            self.keep_output = matches!(keep.to_lowercase().as_str(), "1" | "true" | "yes");
        }
        self.validate()
    }

    fn validate(&self) -> Result<()> {
        if self.timeout_ms == 0 {
            bail!("timeout_ms must be greater than zero");
        }
        for name in self.cases.keys() {
            if let Err(reason) = layout::validate(name) {
                bail!("Invalid case override key: {}", reason);
            }
        }
        Ok(())
    }

    /// Comparison policy in effect for this configuration
    pub fn effective_policy(&self) -> ComparisonPolicy {
        self.policy
            .unwrap_or_else(|| ComparisonPolicy::for_extension(&self.output_extension))
    }

    /// Overrides for a case, keyed by either `foo` or `test_foo`
    pub fn overrides(&self, name: &str) -> Option<&CaseOverrides> {
        self.cases
            .get(&layout::canonical_name(name))
            .or_else(|| self.cases.get(layout::stem(name)))
    }

    /// Resolve an identifier into a fully specified test case
    ///
    /// Returns the validation failure reason for identifiers that cannot
    /// name a case.
    pub fn resolve(&self, name: &str) -> std::result::Result<TestCase, String> {
        layout::validate(name)?;

        let overrides = self.overrides(name);
        let reference = match overrides.and_then(|o| o.reference.as_deref()) {
            Some(file) => self.reference_dir.join(file),
            None => layout::reference_path(&self.reference_dir, name, &self.output_extension),
        };
        let ignore = overrides
            .map(|o| IgnoreRules {
                files: o.ignore_files.clone(),
                elements: o.ignore_elements.clone(),
            })
            .unwrap_or_default();

        // Outputs are deleted before and after every run
        if let Some(owner) = layout::output_owner(&self.exe_dir, &reference, &self.output_extension) {
            return Err(format!(
                "reference {} is the output path of '{}'",
                reference.display(),
                owner
            ));
        }

        Ok(TestCase {
            name: layout::canonical_name(name),
            executable: layout::executable_path(&self.exe_dir, name),
            output: layout::output_path(&self.exe_dir, name, &self.output_extension),
            reference,
            policy: self.effective_policy(),
            ignore,
        })
    }
}
