use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// How a produced output file is judged against its reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComparisonPolicy {
    /// Byte-for-byte equality
    Exact,
    /// Structural XLSX equivalence, ignoring volatile metadata
    Xlsx,
}

impl ComparisonPolicy {
    /// Default policy for an output extension
    pub fn for_extension(extension: &str) -> Self {
        match extension.to_ascii_lowercase().as_str() {
            "xlsx" | "xlsm" => ComparisonPolicy::Xlsx,
            _ => ComparisonPolicy::Exact,
        }
    }
}

impl fmt::Display for ComparisonPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComparisonPolicy::Exact => write!(f, "exact"),
            ComparisonPolicy::Xlsx => write!(f, "xlsx"),
        }
    }
}

impl std::str::FromStr for ComparisonPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "exact" => Ok(ComparisonPolicy::Exact),
            "xlsx" => Ok(ComparisonPolicy::Xlsx),
            other => Err(format!("Unknown comparison policy: {}", other)),
        }
    }
}

/// Elements and archive members a single case may disregard
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IgnoreRules {
    /// Archive members skipped entirely (e.g. `xl/calcChain.xml`)
    #[serde(default)]
    pub files: Vec<String>,
    /// Per-member regex patterns; matching tags are dropped from both sides
    #[serde(default)]
    pub elements: BTreeMap<String, Vec<String>>,
}

impl IgnoreRules {
    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.elements.is_empty()
    }
}

/// A resolved test case: one executable, one output, one reference
///
/// Built at invocation time from a case identifier and never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    /// Canonical `test_<stem>` identifier
    pub name: String,
    pub executable: PathBuf,
    /// Where the executable is expected to write its single artifact
    pub output: PathBuf,
    pub reference: PathBuf,
    pub policy: ComparisonPolicy,
    pub ignore: IgnoreRules,
}

impl TestCase {
    /// Directory the executable runs in
    pub fn working_dir(&self) -> PathBuf {
        self.executable
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

/// Detail about the first place where output and reference diverge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mismatch {
    /// Archive member the difference was found in, if any
    pub part: Option<String>,
    pub summary: String,
    /// Context from the produced output
    pub got: Vec<String>,
    /// Context from the reference file
    pub expected: Vec<String>,
}

impl Mismatch {
    pub fn new(summary: impl Into<String>) -> Self {
        Self {
            part: None,
            summary: summary.into(),
            got: Vec::new(),
            expected: Vec::new(),
        }
    }

    pub fn in_part(mut self, part: impl Into<String>) -> Self {
        self.part = Some(part.into());
        self
    }

    pub fn with_context(mut self, got: Vec<String>, expected: Vec<String>) -> Self {
        self.got = got;
        self.expected = expected;
        self
    }
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.part {
            Some(part) => write!(f, "{}: {}", part, self.summary)?,
            None => write!(f, "{}", self.summary)?,
        }
        if !self.got.is_empty() || !self.expected.is_empty() {
            write!(f, "\n  got:")?;
            for line in &self.got {
                write!(f, "\n    {}", line)?;
            }
            write!(f, "\n  expected:")?;
            for line in &self.expected {
                write!(f, "\n    {}", line)?;
            }
        }
        Ok(())
    }
}

/// Outcome of one comparison
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComparisonResult {
    pub matched: bool,
    pub mismatch: Option<Mismatch>,
}

impl ComparisonResult {
    pub fn matched() -> Self {
        Self {
            matched: true,
            mismatch: None,
        }
    }

    pub fn mismatch(detail: Mismatch) -> Self {
        Self {
            matched: false,
            mismatch: Some(detail),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CaseStatus {
    Passed,
    Mismatch,
    ExecutionError,
    MissingReference,
    InvalidCase,
}

/// Result of running a single case inside a suite
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseReport {
    pub name: String,
    pub status: CaseStatus,
    /// Failure description; `None` for passing cases
    pub message: Option<String>,
    pub duration_ms: u64,
}

impl CaseReport {
    pub fn passed(&self) -> bool {
        self.status == CaseStatus::Passed
    }
}

/// Aggregated results of a sequential suite run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteReport {
    pub started_at: DateTime<Utc>,
    pub cases: Vec<CaseReport>,
    pub passed: usize,
    pub failed: usize,
}

impl SuiteReport {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            cases: Vec::new(),
            passed: 0,
            failed: 0,
        }
    }

    pub fn record(&mut self, report: CaseReport) {
        if report.passed() {
            self.passed += 1;
        } else {
            self.failed += 1;
        }
        self.cases.push(report);
    }

    pub fn total(&self) -> usize {
        self.cases.len()
    }

    pub fn all_passed(&self) -> bool {
        self.failed == 0
    }
}
