//! Configuration helpers shared by the CLI and the library builder

use anyhow::{Context, Result, bail};
use fxhash::FxHashSet;
use std::path::{Path, PathBuf};

/// Environment variable naming the formatter executable
pub const FORMATTER_ENV: &str = "CLANG_FORMAT_EXE";

/// Formatter used when neither a path nor the environment names one
pub const DEFAULT_FORMATTER: &str = if cfg!(windows) {
    "clang-format.exe"
} else {
    "clang-format"
};

/// Expand an indentation spec into the literal indent string
///
/// `\t` (backslash, t) and `<tab>` stand for a tab character. The result may
/// only contain whitespace.
///
/// # Errors
/// Returns an error when the expanded spec contains anything but whitespace.
pub fn parse_indent(spec: &str) -> Result<String> {
    let indent = spec.replace("\\t", "\t").replace("<tab>", "\t");
    if let Some(bad) = indent.chars().find(|c| !c.is_whitespace()) {
        bail!("Invalid indent '{spec}': unexpected character '{bad}'");
    }
    Ok(indent)
}

/// Turn `--exclude` values into a set of names
///
/// A value naming an existing file contributes every non-blank line of that
/// file with trailing whitespace removed; any other value is a name itself.
pub fn load_excludes<S: AsRef<str>>(values: &[S]) -> Result<FxHashSet<String>> {
    let mut excludes = FxHashSet::default();
    for value in values {
        let value = value.as_ref();
        let path = Path::new(value);
        if path.is_file() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read exclusion list '{value}'"))?;
            excludes.extend(
                contents
                    .lines()
                    .map(str::trim_end)
                    .filter(|name| !name.is_empty())
                    .map(str::to_string),
            );
        } else {
            excludes.insert(value.to_string());
        }
    }
    Ok(excludes)
}

/// Whether a whole input file is excluded by name
///
/// An entry matches the path as given or its bare file name. Comparison
/// ignores case, like the file systems this usually runs on.
pub fn is_excluded_file(path: &Path, excludes: &FxHashSet<String>) -> bool {
    let full = path.to_string_lossy().to_lowercase();
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase());
    excludes.iter().any(|exclude| {
        let exclude = exclude.to_lowercase();
        exclude == full || name.as_deref() == Some(exclude.as_str())
    })
}

/// Pick the formatter executable
///
/// An explicit path wins, then the environment, then the platform default.
pub fn resolve_formatter(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    match std::env::var_os(FORMATTER_ENV) {
        Some(value) if !value.is_empty() => PathBuf::from(value),
        _ => PathBuf::from(DEFAULT_FORMATTER),
    }
}
