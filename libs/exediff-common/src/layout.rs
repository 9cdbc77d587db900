use std::path::{Path, PathBuf};

/// Filesystem naming conventions - defines only naming, not execution
/// Ensures runner, CLI and discovery never drift, and that every case
/// identifier maps to exactly one executable, output and reference file

pub const CASE_PREFIX: &str = "test_";

/// Check that an identifier can be turned into file names safely
pub fn validate(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("identifier is empty".to_string());
    }
    if stem(name).is_empty() {
        return Err(format!("identifier '{}' has nothing after the '{}' prefix", name, CASE_PREFIX));
    }
    // Extensions are added by the layout, never part of an identifier
    if let Some(bad) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '-')))
    {
        return Err(format!("identifier '{}' contains invalid character {:?}", name, bad));
    }
    Ok(())
}

/// Identifier without the `test_` prefix (`test_chart_layout01` -> `chart_layout01`)
pub fn stem(name: &str) -> &str {
    name.strip_prefix(CASE_PREFIX).unwrap_or(name)
}

/// Canonical `test_<stem>` form; `foo` and `test_foo` name the same case
pub fn canonical_name(name: &str) -> String {
    format!("{}{}", CASE_PREFIX, stem(name))
}

/// Executable for a case, with the platform executable suffix
pub fn executable_path(exe_dir: &Path, name: &str) -> PathBuf {
    exe_dir.join(format!("{}{}", canonical_name(name), std::env::consts::EXE_SUFFIX))
}

/// File the executable writes into its working directory
pub fn output_path(exe_dir: &Path, name: &str, extension: &str) -> PathBuf {
    exe_dir.join(with_extension(&canonical_name(name), extension))
}

/// Checked-in reference file for a case
pub fn reference_path(reference_dir: &Path, name: &str, extension: &str) -> PathBuf {
    reference_dir.join(with_extension(stem(name), extension))
}

/// Map a directory entry back to a case name, if it looks like a test executable
pub fn case_name_from_executable(file_name: &str) -> Option<String> {
    let suffix = std::env::consts::EXE_SUFFIX;
    let base = if suffix.is_empty() {
        file_name
    } else {
        file_name.strip_suffix(suffix)?
    };

    // Sources, objects and produced artifacts all carry an extension and fail validation
    if !base.starts_with(CASE_PREFIX) {
        return None;
    }
    validate(base).ok()?;
    Some(base.to_string())
}

/// Case whose output file `path` would be, if any
pub fn output_owner(exe_dir: &Path, path: &Path, extension: &str) -> Option<String> {
    if path.parent()? != exe_dir {
        return None;
    }
    let file_name = path.file_name()?.to_str()?;
    let base = match extension.trim_start_matches('.') {
        "" => file_name,
        ext => file_name.strip_suffix(ext)?.strip_suffix('.')?,
    };
    if !base.starts_with(CASE_PREFIX) {
        return None;
    }
    validate(base).ok()?;
    Some(base.to_string())
}

fn with_extension(base: &str, extension: &str) -> String {
    let extension = extension.trim_start_matches('.');
    if extension.is_empty() {
        base.to_string()
    } else {
        format!("{}.{}", base, extension)
    }
}
