/// Test Runner - High-Level Orchestration
///
/// **Responsibility:**
/// Turn a case identifier into a pass/fail verdict.
///
/// **Architecture:**
/// 1. Resolve the identifier to executable, output and reference paths (config + layout)
/// 2. Run the executable through an ExecutionEngine (engine.rs)
/// 3. Judge the produced file with a Comparator (comparator.rs)
///
/// This module is the glue layer - it knows nothing about:
/// - How processes are launched (engine's job)
/// - How files are compared (comparator's job)
use std::path::Path;
use std::time::{Duration, Instant};

use chrono::Utc;
use exediff_common::config::HarnessConfig;
use exediff_common::layout;
use exediff_common::types::{CaseReport, CaseStatus, Mismatch, SuiteReport, TestCase};
use tracing::{debug, info, instrument, warn};

use crate::comparator::{Comparator, PolicyComparator};
use crate::engine::{ArtifactGuard, ExecutionEngine, Invocation, ProcessEngine};
use crate::error::{ExecutionFailure, HarnessError};

/// Run one case with the default configuration, blocking until it finishes
///
/// Entry point for `#[test]` functions. Must not be called from inside a
/// tokio runtime; async callers use [`TestRunner::run`].
pub fn run_exe_test(name: &str) -> Result<(), HarnessError> {
    TestRunner::from_default_config()?.run_blocking(name)
}

/// Composes path resolution, execution and comparison
pub struct TestRunner<E = ProcessEngine, C = PolicyComparator> {
    config: HarnessConfig,
    engine: E,
    comparator: C,
}

impl TestRunner {
    pub fn new(config: HarnessConfig) -> Self {
        Self::with_parts(config, ProcessEngine::new(), PolicyComparator)
    }

    /// `config/harness.json` (if present) plus `EXEDIFF_*` overrides
    pub fn from_default_config() -> Result<Self, HarnessError> {
        let config = HarnessConfig::load_default().map_err(HarnessError::Config)?;
        Ok(Self::new(config))
    }
}

impl<E: ExecutionEngine, C: Comparator> TestRunner<E, C> {
    pub fn with_parts(config: HarnessConfig, engine: E, comparator: C) -> Self {
        Self {
            config,
            engine,
            comparator,
        }
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub fn resolve(&self, name: &str) -> Result<TestCase, HarnessError> {
        self.config
            .resolve(name)
            .map_err(|reason| HarnessError::InvalidCase {
                name: name.to_string(),
                reason,
            })
    }

    /// Run a single case: pass is `Ok(())`
    ///
    /// The produced artifact is removed on every exit path unless the
    /// configuration asks to keep it.
    #[instrument(skip(self), fields(case = %name))]
    pub async fn run(&self, name: &str) -> Result<(), HarnessError> {
        let case = self.resolve(name)?;

        // A missing fixture is a harness setup problem; report it before running anything
        if !case.reference.is_file() {
            return Err(HarnessError::MissingReferenceFile {
                case: case.name,
                path: case.reference,
            });
        }

        let mut guard =
            ArtifactGuard::new(&case.output).map_err(|e| HarnessError::io(&case.output, e))?;
        if self.config.keep_output {
            guard.disarm();
        }

        debug!(
            executable = %case.executable.display(),
            reference = %case.reference.display(),
            policy = %case.policy,
            "Running test case"
        );

        let invocation = Invocation {
            executable: case.executable.clone(),
            working_dir: case.working_dir(),
            timeout: Duration::from_millis(self.config.timeout_ms),
        };

        let execution_failed = |failure: ExecutionFailure| HarnessError::Execution {
            case: case.name.clone(),
            failure,
        };

        let output = self
            .engine
            .execute(&invocation)
            .await
            .map_err(execution_failed)?;
        output
            .check_status(self.config.timeout_ms)
            .map_err(execution_failed)?;

        if !guard.path().is_file() {
            return Err(execution_failed(ExecutionFailure::MissingOutput {
                path: case.output.clone(),
            }));
        }

        let got = read_file(&case.output).await?;
        let expected = read_file(&case.reference).await?;

        let result = self
            .comparator
            .compare(&got, &expected, &case)
            .map_err(|e| HarnessError::InvalidCase {
                name: case.name.clone(),
                reason: e.to_string(),
            })?;

        if result.matched {
            info!(elapsed_ms = output.execution_time_ms, "Output matches reference");
            Ok(())
        } else {
            let mismatch = result
                .mismatch
                .unwrap_or_else(|| Mismatch::new("output differs from reference"));
            Err(HarnessError::ComparisonMismatch {
                case: case.name,
                mismatch,
            })
        }
    }

    /// Blocking form of [`TestRunner::run`] on a private current-thread runtime
    pub fn run_blocking(&self, name: &str) -> Result<(), HarnessError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(HarnessError::Runtime)?;
        runtime.block_on(self.run(name))
    }

    /// Run cases one after another; each case's outcome is independent of the others
    pub async fn run_suite<I, S>(&self, names: I) -> SuiteReport
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut report = SuiteReport::new(Utc::now());

        for name in names {
            let name = name.as_ref();
            let start_time = Instant::now();
            let outcome = self.run(name).await;
            let duration_ms = start_time.elapsed().as_millis() as u64;

            let display_name = if layout::validate(name).is_ok() {
                layout::canonical_name(name)
            } else {
                name.to_string()
            };

            let case_report = match outcome {
                Ok(()) => CaseReport {
                    name: display_name,
                    status: CaseStatus::Passed,
                    message: None,
                    duration_ms,
                },
                Err(e) => {
                    warn!(case = %display_name, error = %e, "Test case failed");
                    CaseReport {
                        name: display_name,
                        status: e.status(),
                        message: Some(e.to_string()),
                        duration_ms,
                    }
                }
            };
            report.record(case_report);
        }

        info!(
            total = report.total(),
            passed = report.passed,
            failed = report.failed,
            "Suite complete"
        );
        report
    }

    /// Case names of every test executable in the executable directory, sorted
    pub fn discover(&self) -> Result<Vec<String>, HarnessError> {
        let dir = &self.config.exe_dir;
        let entries = std::fs::read_dir(dir).map_err(|e| HarnessError::io(dir, e))?;

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| HarnessError::io(dir, e))?;
            if !entry.path().is_file() {
                continue;
            }
            if let Some(name) = entry
                .file_name()
                .to_str()
                .and_then(layout::case_name_from_executable)
            {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }
}

async fn read_file(path: &Path) -> Result<Vec<u8>, HarnessError> {
    tokio::fs::read(path)
        .await
        .map_err(|e| HarnessError::io(path, e))
}
