use crate::core::instrument::InstrumentStats;
use anyhow::{Context, Result};
use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Placeholder in a log path replaced by the current time
const TIMESTAMP_PLACEHOLDER: &str = "{timestamp}";

/// A decision taken while rewriting a file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind")]
pub enum TraceEvent {
    /// A brace scope opened; `depth` is the depth after entering
    ScopeEntered { depth: usize },
    /// A brace scope closed; `depth` is the depth before leaving
    ScopeExited { depth: usize },
    LockDeclared {
        name: String,
        mutex: String,
        id: Option<String>,
        deferred: bool,
        excluded: bool,
    },
    LockAcquired { name: String },
    LockReleased { name: String },
    /// Cleanup emitted for a record owned by a closing scope
    CleanupEmitted {
        mutex: String,
        unlocked: bool,
        before_return: bool,
    },
    /// The header directive was inserted at this output line
    HeaderInserted,
    /// A file's instrumentation pass completed
    PassFinished { stats: InstrumentStats },
    /// An instrumented line was restored from its revert marker
    LineReverted,
    /// A synthetic statement was dropped while reverting
    SyntheticDropped,
}

/// One JSON line of the trace
#[derive(Debug, Serialize)]
pub struct LogEntry<'a> {
    /// File being processed
    pub file: &'a str,
    /// 0-based line of the file the event belongs to
    pub line: usize,
    pub event: &'a TraceEvent,
    /// Seconds since the Unix Epoch with microsecond precision
    pub timestamp: f64,
}

/// Where trace records go
#[derive(Debug)]
pub enum LoggerMode {
    /// Tracing is off
    Disabled,
    /// Append to this file
    ToFile(File, PathBuf),
}

/// Logger for recording rewrite decisions as JSON lines
pub struct EventLogger {
    mode: LoggerMode,
    source: String,
}

impl Default for EventLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl EventLogger {
    /// A logger that records nothing
    pub fn new() -> Self {
        EventLogger {
            mode: LoggerMode::Disabled,
            source: String::new(),
        }
    }

    /// A logger appending JSON lines to `path`
    ///
    /// A `{timestamp}` in the path is replaced with the current time, and
    /// missing parent directories are created.
    pub fn with_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = resolve_log_path(path.as_ref());

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).context("Failed to create log directory")?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .context("Failed to open log file")?;

        Ok(EventLogger {
            mode: LoggerMode::ToFile(file, path),
            source: String::new(),
        })
    }

    /// Name the file subsequent events belong to
    pub fn set_source(&mut self, source: impl Into<String>) {
        self.source = source.into();
    }

    /// Log an event based on the configured mode
    pub fn log_event(&self, line: usize, event: &TraceEvent) {
        let LoggerMode::ToFile(ref file, _) = self.mode else {
            return;
        };

        let now = Utc::now();
        let timestamp = now.timestamp() as f64 + now.timestamp_subsec_micros() as f64 / 1_000_000.0;

        let entry = LogEntry {
            file: &self.source,
            line,
            event,
            timestamp,
        };

        let mut file = file;
        if let Ok(json) = serde_json::to_string(&entry) {
            let _ = writeln!(file, "{json}");
            let _ = file.flush();
        }
    }

    /// Whether records are written anywhere
    pub fn is_enabled(&self) -> bool {
        !matches!(self.mode, LoggerMode::Disabled)
    }

    pub fn path(&self) -> Option<&Path> {
        match &self.mode {
            LoggerMode::ToFile(_, path) => Some(path),
            LoggerMode::Disabled => None,
        }
    }
}

fn resolve_log_path(path: &Path) -> PathBuf {
    let text = path.to_string_lossy();
    if text.contains(TIMESTAMP_PLACEHOLDER) {
        let stamp = Utc::now().format("%Y%m%d_%H%M%S").to_string();
        PathBuf::from(text.replace(TIMESTAMP_PLACEHOLDER, &stamp))
    } else {
        path.to_path_buf()
    }
}

// Process-wide trace logger
lazy_static::lazy_static! {
    static ref GLOBAL_LOGGER: Mutex<EventLogger> = Mutex::new(EventLogger::new());
}

/// Route tracing to `path`, or switch it off with `None`
pub fn init_logger<P: AsRef<Path>>(path: Option<P>) -> Result<()> {
    let logger = match path {
        Some(path) => EventLogger::with_file(path).context("Failed to create logger with file")?,
        None => EventLogger::new(),
    };
    *GLOBAL_LOGGER.lock() = logger;
    Ok(())
}

/// Name the source file that following events refer to
pub fn set_source(source: impl Into<String>) {
    GLOBAL_LOGGER.lock().set_source(source);
}

/// Record an event for the current source file
pub fn log_event(line: usize, event: TraceEvent) {
    GLOBAL_LOGGER.lock().log_event(line, &event);
}

/// Whether tracing is on
pub fn is_logging_enabled() -> bool {
    GLOBAL_LOGGER.lock().is_enabled()
}

/// Path of the active log file, if any
pub fn get_current_log_file() -> Option<PathBuf> {
    GLOBAL_LOGGER.lock().path().map(Path::to_path_buf)
}
