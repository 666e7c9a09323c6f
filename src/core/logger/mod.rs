//! Trace logging for Dreadlock Instrument
//!
//! Records the scope, lock and cleanup decisions taken while rewriting files
//! as JSON lines, so a surprising rewrite can be explained after the fact.

mod event_logger;

pub use event_logger::{
    EventLogger, TraceEvent, get_current_log_file, init_logger, is_logging_enabled, log_event,
    set_source,
};
