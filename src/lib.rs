//! # Dreadlock Instrument
//!
//! Source-to-source instrumentation of C++ translation units for deadlock
//! detection.
//!
//! Every `std::unique_lock` declaration, and every `.lock()`/`.unlock()` call
//! on such a lock, is rewritten into a Dreadlock bookkeeping macro. Where a
//! lock goes out of scope, synthetic unlock/destruct statements are injected
//! so the macro library sees each lock released on every scope exit. Each
//! rewritten line keeps its original text in a revert marker, so the change
//! can be undone byte for byte.
//!
//! ## Features
//!
//! - String- and comment-aware brace scanning, no compiler front end needed
//! - Lock lifetime tracking across nested scopes
//! - Exclusion of individual mutexes or whole files
//! - Exact revert of instrumented files
//! - Optional `clang-format` pre-pass and JSON-lines trace log

mod core;
pub use core::{
    InstrumentOptions, InstrumentStats, Instrumented, Instrumenter, LockRecord, LockStateTracker,
    Position, Reverted, Scope, ScopeEvent, ScopeMap, SiteKind, SymbolTable, config,
    init_logger, instrument, logger, revert, sanitize, scan, scanner, tracker,
};

pub mod driver;

pub const BANNER: &str = "Dreadlock Instrument -- infuse C++ modules with dread of mutex deadlocks.";
