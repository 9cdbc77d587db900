// CLI commands for exediff
use anyhow::{bail, Context, Result};
use exediff_common::config::HarnessConfig;
use exediff_common::types::{ComparisonPolicy, IgnoreRules, SuiteReport};
use exediff_harness::comparator::compare_with_policy;
use exediff_harness::TestRunner;
use std::path::Path;
use tracing::info;

/// Flags of `exediff run`
#[derive(Debug, Default)]
pub struct RunOptions {
    pub names: Vec<String>,
    pub timeout_ms: Option<u64>,
    pub policy: Option<ComparisonPolicy>,
    pub keep_output: bool,
    pub json: bool,
}

/// Explicit file if given, default location otherwise; environment applies to both
fn load_config(path: Option<&Path>) -> Result<HarnessConfig> {
    match path {
        Some(path) => {
            let mut config = HarnessConfig::load(path)?;
            config.apply_env()?;
            Ok(config)
        }
        None => HarnessConfig::load_default(),
    }
}

/// Command-line flags win over file and environment
fn apply_flags(config: &mut HarnessConfig, options: &RunOptions) -> Result<()> {
    if let Some(ms) = options.timeout_ms {
        if ms == 0 {
            bail!("--timeout-ms must be greater than zero");
        }
        config.timeout_ms = ms;
    }
    if let Some(policy) = options.policy {
        config.policy = Some(policy);
    }
    if options.keep_output {
        config.keep_output = true;
    }
    Ok(())
}

/// Run cases and print results; `Ok(false)` when any case failed
pub async fn run_cases(config_path: Option<&Path>, options: RunOptions) -> Result<bool> {
    let mut config = load_config(config_path)?;
    apply_flags(&mut config, &options)?;

    let runner = TestRunner::new(config);
    let names = if options.names.is_empty() {
        let discovered = runner.discover()?;
        if discovered.is_empty() {
            bail!(
                "No test executables found in {}",
                runner.config().exe_dir.display()
            );
        }
        info!(count = discovered.len(), "Discovered test cases");
        discovered
    } else {
        options.names
    };

    let report = runner.run_suite(&names).await;

    if options.json {
        let json = serde_json::to_string_pretty(&report).context("Failed to serialize suite report")?;
        println!("{}", json);
    } else {
        print_report(&report);
    }

    Ok(report.all_passed())
}

fn print_report(report: &SuiteReport) {
    for case in &report.cases {
        match &case.message {
            None => println!("✅ {} ({}ms)", case.name, case.duration_ms),
            Some(message) => println!("❌ {} ({}ms)\n   {}", case.name, case.duration_ms, message),
        }
    }
    println!();
    println!("{}/{} passed", report.passed, report.total());
}

/// Print every discoverable case name
pub fn list_cases(config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path)?;
    let runner = TestRunner::new(config);
    for name in runner.discover()? {
        println!("{}", name);
    }
    Ok(())
}

/// Policy for a direct comparison: explicit, else from the produced file's extension
fn diff_policy(got: &Path, policy: Option<ComparisonPolicy>) -> ComparisonPolicy {
    policy.unwrap_or_else(|| {
        let extension = got.extension().and_then(|e| e.to_str()).unwrap_or_default();
        ComparisonPolicy::for_extension(extension)
    })
}

/// Compare two files; `Ok(false)` on mismatch
pub async fn diff_files(got: &Path, expected: &Path, policy: Option<ComparisonPolicy>) -> Result<bool> {
    let got_bytes = tokio::fs::read(got)
        .await
        .with_context(|| format!("Failed to read {}", got.display()))?;
    let expected_bytes = tokio::fs::read(expected)
        .await
        .with_context(|| format!("Failed to read {}", expected.display()))?;

    let policy = diff_policy(got, policy);
    let result = compare_with_policy(policy, &got_bytes, &expected_bytes, &IgnoreRules::default())?;

    match result.mismatch {
        None => {
            println!("✅ Files match ({} policy)", policy);
            Ok(true)
        }
        Some(mismatch) => {
            println!("❌ Files differ ({} policy)", policy);
            println!("{}", mismatch);
            Ok(false)
        }
    }
}
