/// Output Comparator - Policy-Driven Equivalence Checks
///
/// **Core Responsibility:**
/// Decide whether a produced artifact matches its reference file.
///
/// **Critical Properties:**
/// - Knows nothing about processes
/// - Knows nothing about where files live
/// - Pure function: (output bytes, reference bytes, case rules) -> result
///
/// **Policies:**
/// - `Exact`: byte-for-byte equality, first differing offset reported
/// - `Xlsx`: structural workbook equivalence (see [`crate::xlsx`])
///
/// Both policies accept byte-identical files without further work, so a
/// reference copied from a passing run always passes.
use exediff_common::types::{ComparisonPolicy, ComparisonResult, IgnoreRules, Mismatch, TestCase};

use crate::error::CompareError;
use crate::xlsx::{compare_xlsx, IgnoreMatcher};

/// Bytes of context shown on each side of the first differing byte
const HEX_CONTEXT: usize = 8;

/// Swappable comparison backend
pub trait Comparator {
    fn compare(
        &self,
        got: &[u8],
        expected: &[u8],
        case: &TestCase,
    ) -> Result<ComparisonResult, CompareError>;
}

/// Compares using whatever policy the case was resolved with
#[derive(Debug, Clone, Default)]
pub struct PolicyComparator;

impl Comparator for PolicyComparator {
    fn compare(
        &self,
        got: &[u8],
        expected: &[u8],
        case: &TestCase,
    ) -> Result<ComparisonResult, CompareError> {
        compare_with_policy(case.policy, got, expected, &case.ignore)
    }
}

/// Compare two byte sequences under a policy
pub fn compare_with_policy(
    policy: ComparisonPolicy,
    got: &[u8],
    expected: &[u8],
    ignore: &IgnoreRules,
) -> Result<ComparisonResult, CompareError> {
    match policy {
        ComparisonPolicy::Exact => Ok(compare_bytes(got, expected)),
        ComparisonPolicy::Xlsx => {
            let matcher = IgnoreMatcher::compile(ignore)?;
            Ok(compare_xlsx(got, expected, &matcher))
        }
    }
}

/// Byte-for-byte comparison
pub fn compare_bytes(got: &[u8], expected: &[u8]) -> ComparisonResult {
    if got == expected {
        return ComparisonResult::matched();
    }

    let offset = got
        .iter()
        .zip(expected)
        .position(|(g, e)| g != e)
        .unwrap_or_else(|| got.len().min(expected.len()));

    let summary = match (got.get(offset), expected.get(offset)) {
        (Some(g), Some(e)) => format!(
            "first difference at byte {} (got 0x{:02x}, expected 0x{:02x}); sizes {} vs {}",
            offset,
            g,
            e,
            got.len(),
            expected.len()
        ),
        _ => format!(
            "identical for {} bytes, then one side ends; sizes {} vs {}",
            offset,
            got.len(),
            expected.len()
        ),
    };

    ComparisonResult::mismatch(
        Mismatch::new(summary).with_context(hex_window(got, offset), hex_window(expected, offset)),
    )
}

fn hex_window(bytes: &[u8], offset: usize) -> Vec<String> {
    let start = offset.saturating_sub(HEX_CONTEXT).min(bytes.len());
    let end = (offset + HEX_CONTEXT).min(bytes.len());
    let hex: Vec<String> = bytes[start..end].iter().map(|b| format!("{:02x}", b)).collect();
    vec![format!("{:08x}: {}", start, hex.join(" "))]
}
