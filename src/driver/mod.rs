//! Batch driver
//!
//! Expands the input arguments, applies file-level exclusions, runs each
//! file through instrumentation, revert or the debug dump, and delivers the
//! result to standard output or back to the file. A file that fails is
//! reported and skipped; the rest of the batch still runs.

use crate::core::config::is_excluded_file;
use crate::core::{Instrumenter, logger};
use anyhow::{Context, Result, bail};
use fxhash::FxHashSet;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Which engine a run drives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Instrument,
    Revert,
    /// Print each file's scope map instead of rewriting it
    Debug,
}

/// Where rewritten text goes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Sink {
    #[default]
    Stdout,
    Overwrite,
    /// Process everything, write nothing
    DryRun,
}

/// Settings of a batch run
#[derive(Debug, Clone, Default)]
pub struct RunConfig {
    pub mode: Mode,
    pub sink: Sink,
    pub instrumenter: Instrumenter,
    /// Names matched against input paths to skip whole files
    pub excluded_files: FxHashSet<String>,
}

/// What happened to one input file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOutcome {
    Instrumented,
    Unchanged,
    Excluded,
    Reverted,
    NothingToRevert,
    Dumped,
    Failed,
}

/// Per-file outcomes of a batch run
#[derive(Debug, Default)]
pub struct RunSummary {
    pub outcomes: Vec<(PathBuf, FileOutcome)>,
}

impl RunSummary {
    pub fn failed(&self) -> usize {
        self.count(FileOutcome::Failed)
    }

    pub fn count(&self, outcome: FileOutcome) -> usize {
        self.outcomes.iter().filter(|(_, o)| *o == outcome).count()
    }
}

/// Expand glob patterns; a pattern matching nothing is kept as a path
///
/// # Errors
/// Fails when no file was named at all.
pub fn expand_inputs<S: AsRef<str>>(args: &[S]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for arg in args {
        let arg = arg.as_ref();
        let matches: Vec<PathBuf> = match glob::glob(arg) {
            Ok(paths) => paths.filter_map(Result::ok).collect(),
            Err(_) => Vec::new(),
        };
        if matches.is_empty() {
            files.push(PathBuf::from(arg));
        } else {
            files.extend(matches);
        }
    }

    if files.is_empty() {
        bail!("No files specified!  Nothing to do!");
    }
    Ok(files)
}

/// Run a batch over the given arguments
///
/// Rewritten text is written to `out`, progress notices to `status`.
///
/// # Errors
/// Fails before touching any file when no file is named or one of them does
/// not exist. Failures of individual files are reported in the summary.
pub fn run<S, O, E>(config: &RunConfig, args: &[S], out: &mut O, status: &mut E) -> Result<RunSummary>
where
    S: AsRef<str>,
    O: Write,
    E: Write,
{
    let files = expand_inputs(args)?;
    if let Some(missing) = files.iter().find(|f| !f.exists()) {
        bail!("File '{}' does not exist!", missing.display());
    }

    let mut summary = RunSummary::default();
    for file in files {
        logger::set_source(file.display().to_string());
        let outcome = match process_file(config, &file, out, status) {
            Ok(outcome) => outcome,
            Err(e) => {
                writeln!(status, "Error: {e:#}")?;
                FileOutcome::Failed
            }
        };
        summary.outcomes.push((file, outcome));
    }
    Ok(summary)
}

fn process_file<O: Write, E: Write>(
    config: &RunConfig,
    path: &Path,
    out: &mut O,
    status: &mut E,
) -> Result<FileOutcome> {
    if is_excluded_file(path, &config.excluded_files) {
        writeln!(status, "Excluding file '{}'.", path.display())?;
        return Ok(FileOutcome::Excluded);
    }

    match config.mode {
        Mode::Debug => {
            let map = config.instrumenter.scan_file(path)?;
            out.write_all(map.render().as_bytes())?;
            Ok(FileOutcome::Dumped)
        }
        Mode::Instrument => {
            let result = config.instrumenter.instrument_file(path)?;
            if !result.changed {
                writeln!(
                    status,
                    "Instrumenting '{}' ... file was not modified.",
                    path.display()
                )?;
                return Ok(FileOutcome::Unchanged);
            }
            deliver(config.sink, path, &result.lines, out)?;
            writeln!(status, "Instrumenting '{}' ... done.", path.display())?;
            Ok(FileOutcome::Instrumented)
        }
        Mode::Revert => {
            let result = config.instrumenter.revert_file(path)?;
            if !result.found_markers() {
                writeln!(
                    status,
                    "No revert markers were found in '{}'! (Did you explicitly disable revert for this file?)",
                    path.display()
                )?;
                return Ok(FileOutcome::NothingToRevert);
            }
            deliver(config.sink, path, &result.lines, out)?;
            writeln!(status, "Reverting '{}' ... done.", path.display())?;
            Ok(FileOutcome::Reverted)
        }
    }
}

/// Join lines into file text that always ends with a newline
pub fn render_lines<S: AsRef<str>>(lines: &[S]) -> String {
    let mut text = String::new();
    for line in lines {
        text.push_str(line.as_ref());
        text.push('\n');
    }
    text
}

fn deliver<O: Write, S: AsRef<str>>(sink: Sink, path: &Path, lines: &[S], out: &mut O) -> Result<()> {
    match sink {
        Sink::DryRun => Ok(()),
        Sink::Stdout => {
            out.write_all(render_lines(lines).as_bytes())?;
            Ok(())
        }
        Sink::Overwrite => std::fs::write(path, render_lines(lines))
            .with_context(|| format!("Failed to write '{}'", path.display())),
    }
}
