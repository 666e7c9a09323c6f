// Core types
pub mod types;
pub use types::*;

// Trace logging
pub mod logger;
pub use logger::init_logger;

// Scope Scanner
pub mod scanner;
pub use scanner::{ScopeMap, scan};

// Lock State Tracker
pub mod tracker;
pub use tracker::{LockStateTracker, SymbolTable};

// Instrumentation Engine
pub mod instrument;
pub use instrument::{InstrumentOptions, InstrumentStats, Instrumented};

// Revert Engine
pub mod revert;
pub use revert::Reverted;

pub mod config;
pub mod sanitize;

use anyhow::{Context, Result};
use sanitize::SanitizedSource;
use std::path::{Path, PathBuf};

/// Instrumenter configuration struct
///
/// Collects the settings of an instrumentation run and applies them to
/// source text or files on disk.
#[derive(Debug, Clone, Default)]
pub struct Instrumenter {
    options: InstrumentOptions,
    formatter: Option<PathBuf>,
}

impl Instrumenter {
    /// Create a new Instrumenter with default settings
    ///
    /// By default:
    /// - Synthetic statements are indented four spaces per scope level
    /// - Alignment to observed indentation is off
    /// - Revert markers are written
    /// - Nothing is excluded and no formatter runs first
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the literal indentation used per scope level
    pub fn indent(mut self, indent: impl Into<String>) -> Self {
        self.options.indent = indent.into();
        self
    }

    /// Align synthetic statements with the indentation found in each scope
    pub fn align(mut self, align: bool) -> Self {
        self.options.align = align;
        self
    }

    /// Write (or omit) revert markers on rewritten lines
    pub fn revert_markers(mut self, enabled: bool) -> Self {
        self.options.revert_markers = enabled;
        self
    }

    /// Never instrument locks on this mutex expression
    pub fn exclude(mut self, mutex: impl Into<String>) -> Self {
        self.options.excludes.insert(mutex.into());
        self
    }

    /// Never instrument locks on any of these mutex expressions
    pub fn excludes<I, S>(mut self, mutexes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options.excludes.extend(mutexes.into_iter().map(Into::into));
        self
    }

    /// Run files through this formatter before scanning them
    pub fn sanitize_with<P: AsRef<Path>>(mut self, formatter: P) -> Self {
        self.formatter = Some(formatter.as_ref().to_path_buf());
        self
    }

    pub fn options(&self) -> &InstrumentOptions {
        &self.options
    }

    /// Instrument source text held in memory
    ///
    /// # Errors
    /// Fails on a mutex expression that cannot be instrumented.
    pub fn instrument_source(&self, text: &str) -> Result<Instrumented> {
        instrument::instrument(&scan(text), &self.options)
    }

    /// Scan a file, through the formatter when one is configured
    ///
    /// The formatter's staged output is removed before this returns.
    pub fn scan_file<P: AsRef<Path>>(&self, path: P) -> Result<ScopeMap> {
        let path = path.as_ref();
        match &self.formatter {
            Some(formatter) => {
                let staged = SanitizedSource::format(path, formatter)?;
                Ok(scan(&staged.read()?))
            }
            None => scanner::scan_file(path),
        }
    }

    /// Instrument a file on disk without modifying it
    ///
    /// # Errors
    /// Fails when the file cannot be read or formatted, or on a mutex
    /// expression that cannot be instrumented.
    pub fn instrument_file<P: AsRef<Path>>(&self, path: P) -> Result<Instrumented> {
        let path = path.as_ref();
        let map = self.scan_file(path)?;
        instrument::instrument(&map, &self.options)
            .with_context(|| format!("Failed to instrument '{}'", path.display()))
    }

    /// Revert an instrumented file on disk without modifying it
    pub fn revert_file<P: AsRef<Path>>(&self, path: P) -> Result<Reverted> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read '{}'", path.display()))?;
        Ok(revert::revert_source(&text))
    }
}
