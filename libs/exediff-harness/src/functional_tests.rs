// Chart layout functional tests
//
// Point EXEDIFF_EXE_DIR and EXEDIFF_REFERENCE_DIR at the built test
// executables and their reference workbooks, then:
//   cargo test -p exediff-harness -- --ignored

use crate::error::HarnessError;
use crate::runner::run_exe_test;

#[test]
#[ignore] // Requires built functional test executables
fn test_chart_layout01() -> Result<(), HarnessError> {
    run_exe_test("test_chart_layout01")
}

#[test]
#[ignore] // Requires built functional test executables
fn test_chart_layout02() -> Result<(), HarnessError> {
    run_exe_test("test_chart_layout02")
}

#[test]
#[ignore] // Requires built functional test executables
fn test_chart_layout03() -> Result<(), HarnessError> {
    run_exe_test("test_chart_layout03")
}

#[test]
#[ignore] // Requires built functional test executables
fn test_chart_layout04() -> Result<(), HarnessError> {
    run_exe_test("test_chart_layout04")
}
