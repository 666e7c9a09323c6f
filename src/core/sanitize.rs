//! External formatter pre-pass
//!
//! Optionally normalizes a file through `clang-format` before scanning. The
//! formatter output is staged in a temporary file that is removed when the
//! [`SanitizedSource`] is dropped, whether or not instrumentation succeeds.

use anyhow::{Context, Result, bail};
use std::io::Write;
use std::path::Path;
use std::process::Command;
use tempfile::NamedTempFile;

/// Formatter output staged on disk
pub struct SanitizedSource {
    staged: NamedTempFile,
}

impl SanitizedSource {
    /// Run `formatter <path>` and stage its standard output
    ///
    /// # Errors
    /// Fails when the formatter cannot be started, exits unsuccessfully, or
    /// the temporary file cannot be written.
    pub fn format<P: AsRef<Path>, F: AsRef<Path>>(path: P, formatter: F) -> Result<Self> {
        let path = path.as_ref();
        let formatter = formatter.as_ref();

        let output = Command::new(formatter)
            .arg(path)
            .output()
            .with_context(|| format!("Failed to run formatter '{}'", formatter.display()))?;

        if !output.status.success() {
            bail!(
                "Formatter '{}' failed on '{}': {}",
                formatter.display(),
                path.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        Self::stage(&output.stdout)
    }

    /// Stage already formatted bytes
    pub fn stage(bytes: &[u8]) -> Result<Self> {
        let mut staged = NamedTempFile::new().context("Failed to create temporary file")?;
        staged
            .write_all(bytes)
            .context("Failed to write formatter output")?;
        staged.flush().context("Failed to flush formatter output")?;
        Ok(SanitizedSource { staged })
    }

    pub fn path(&self) -> &Path {
        self.staged.path()
    }

    /// Read the staged text back
    pub fn read(&self) -> Result<String> {
        std::fs::read_to_string(self.path()).context("Failed to read formatter output")
    }
}
