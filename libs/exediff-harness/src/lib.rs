//! Functional-test harness: run a pre-built test executable, then compare the
//! file it produced against a checked-in reference.

pub mod comparator;
pub mod engine;
pub mod error;
pub mod runner;
pub mod xlsx;

#[cfg(test)]
mod functional_tests;
#[cfg(test)]
mod test_support;

pub use error::{ExecutionFailure, HarnessError};
pub use runner::{run_exe_test, TestRunner};
