//! The generated macro vocabulary and the revert-marker format
//!
//! These strings are the contract with the Dreadlock macro library and with
//! the revert pass; their shape must not change.

/// Directive inserted into every instrumented file
pub const HEADER_DIRECTIVE: &str = "#include \"Dreadlock.h\"";

/// Common prefix of every bookkeeping macro
pub const MACRO_PREFIX: &str = "DREADLOCK";

/// Opens the verbatim copy of the original line
pub const REVERT_OPEN: &str = "{{";
/// Closes the verbatim copy of the original line
pub const REVERT_CLOSE: &str = "}}";
/// What precedes the copy on an instrumented line
pub const REVERT_LEAD: &str = " // {{";

/// Trailing comment of synthetic statements
pub const BOOKKEEPING_COMMENT: &str = "  // aids Dreadlock's bookkeeping";

/// One of the bookkeeping macros
///
/// Each has a plain form taking the mutex expression and an `_ID` form
/// taking the mutex expression plus a synthetic id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Macro {
    Declare,
    DeclareDeferred,
    Lock,
    Unlock,
    Destruct,
}

impl Macro {
    fn stem(self) -> &'static str {
        match self {
            Macro::Declare => "DREADLOCK",
            Macro::DeclareDeferred => "DREADLOCK_DEFER",
            Macro::Lock => "DREADLOCK_LOCK",
            Macro::Unlock => "DREADLOCK_UNLOCK",
            Macro::Destruct => "DREADLOCK_DESTRUCT",
        }
    }

    /// The declaration macro for a lock, deferred or not
    pub fn declaration(deferred: bool) -> Self {
        if deferred {
            Macro::DeclareDeferred
        } else {
            Macro::Declare
        }
    }

    /// Render a complete statement, e.g. `DREADLOCK_UNLOCK_ID(obj->m, m);`
    pub fn invoke(self, mutex_expr: &str, synthetic_id: Option<&str>) -> String {
        match synthetic_id {
            Some(id) => format!("{}_ID({mutex_expr}, {id});", self.stem()),
            None => format!("{}({mutex_expr});", self.stem()),
        }
    }
}

/// Inline comment preserving the original text of a rewritten line
pub fn revert_marker(original: &str) -> String {
    format!("{REVERT_LEAD}{original}{REVERT_CLOSE}")
}

/// A cleanup statement that has no counterpart in the original source
pub fn synthetic_statement(indent: &str, statement: &str, depth: usize) -> String {
    format!("{indent}{statement}{BOOKKEEPING_COMMENT} {depth}")
}
