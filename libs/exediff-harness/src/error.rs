/// Harness error types

use std::path::PathBuf;

use exediff_common::types::{CaseStatus, Mismatch};
use thiserror::Error;

/// Why running a test executable did not yield an output file
#[derive(Debug, Error)]
pub enum ExecutionFailure {
    #[error("executable not found: {}", .path.display())]
    ExecutableNotFound { path: PathBuf },

    /// Executable exists but could not be launched (permissions, bad format)
    #[error("failed to launch {}: {source}", .path.display())]
    Spawn {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("exited with status {code}{}", stderr_suffix(.stderr))]
    NonZeroExit { code: i32, stderr: String },

    /// Killed by a signal (crash, abort)
    #[error("terminated without an exit status{}", stderr_suffix(.stderr))]
    Terminated { stderr: String },

    #[error("timed out after {timeout_ms}ms and was killed")]
    TimedOut { timeout_ms: u64 },

    /// Exit status 0, but the expected artifact was never written
    #[error("exited successfully but did not produce {}", .path.display())]
    MissingOutput { path: PathBuf },

    #[error("failed while waiting for the process: {0}")]
    Wait(#[source] std::io::Error),
}

fn stderr_suffix(stderr: &str) -> String {
    match stderr.lines().find(|l| !l.trim().is_empty()) {
        Some(line) => format!(" (stderr: {})", line.trim()),
        None => String::new(),
    }
}

/// Comparison could not be carried out as configured
#[derive(Debug, Error)]
pub enum CompareError {
    #[error("invalid ignore pattern '{pattern}' for {part}: {source}")]
    InvalidPattern {
        part: String,
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Errors that fail a single test case
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("{case}: execution failed: {failure}")]
    Execution {
        case: String,
        #[source]
        failure: ExecutionFailure,
    },

    #[error("{case}: output does not match reference: {mismatch}")]
    ComparisonMismatch { case: String, mismatch: Mismatch },

    #[error("{case}: reference file missing: {}", .path.display())]
    MissingReferenceFile { case: String, path: PathBuf },

    #[error("invalid test case '{name}': {reason}")]
    InvalidCase { name: String, reason: String },

    #[error("IO error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("configuration error: {0:#}")]
    Config(anyhow::Error),

    #[error("failed to start async runtime: {0}")]
    Runtime(#[source] std::io::Error),
}

impl HarnessError {
    /// Suite-level classification of this failure
    pub fn status(&self) -> CaseStatus {
        match self {
            HarnessError::Execution { .. } | HarnessError::Io { .. } | HarnessError::Runtime(_) => {
                CaseStatus::ExecutionError
            }
            HarnessError::ComparisonMismatch { .. } => CaseStatus::Mismatch,
            HarnessError::MissingReferenceFile { .. } => CaseStatus::MissingReference,
            HarnessError::InvalidCase { .. } | HarnessError::Config(_) => CaseStatus::InvalidCase,
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        HarnessError::Io {
            path: path.into(),
            source,
        }
    }
}
