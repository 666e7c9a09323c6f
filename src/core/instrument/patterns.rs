//! Call-site detection
//!
//! Patterns run against the code mask of a line, so nothing inside a string
//! literal or a comment can match. Offsets found in the mask are valid in the
//! original line because the mask preserves byte widths.

use anyhow::{Result, bail};
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// `std::unique_lock<...> name(args)`, template arguments optional
    static ref DECLARATION_RE: Regex = Regex::new(
        r"std::unique_lock(?:\s*<.+?>)?\s+(\w+)\s*\(([^;()]*(?:\([^;()]*\)[^;()]*)*)\)"
    )
    .unwrap_or_else(|e| panic!("regex: {e}"));

    static ref LOCK_RE: Regex =
        Regex::new(r"(\w+)\s*\.\s*lock\s*\(\s*\)").unwrap_or_else(|e| panic!("regex: {e}"));

    static ref UNLOCK_RE: Regex =
        Regex::new(r"(\w+)\s*\.\s*unlock\s*\(\s*\)").unwrap_or_else(|e| panic!("regex: {e}"));

    static ref IDENTIFIER_RE: Regex =
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap_or_else(|e| panic!("regex: {e}"));

    static ref LOCAL_INCLUDE_RE: Regex =
        Regex::new(r#"^\s*#\s*include\s*""#).unwrap_or_else(|e| panic!("regex: {e}"));

    static ref SYSTEM_INCLUDE_RE: Regex =
        Regex::new(r"^\s*#\s*include\s*<").unwrap_or_else(|e| panic!("regex: {e}"));

    static ref RETURN_RE: Regex =
        Regex::new(r"\breturn\b").unwrap_or_else(|e| panic!("regex: {e}"));
}

/// Token marking a lock constructed without acquiring its mutex
pub const DEFER_SENTINEL: &str = "std::defer_lock";

/// A recognized call site on one line
///
/// `at` is the byte offset where the replaced tail of the line starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Site<'a> {
    Declaration {
        at: usize,
        name: &'a str,
        args: &'a str,
    },
    Lock {
        at: usize,
        name: &'a str,
    },
    Unlock {
        at: usize,
        name: &'a str,
    },
}

impl Site<'_> {
    pub fn at(&self) -> usize {
        match *self {
            Site::Declaration { at, .. } | Site::Lock { at, .. } | Site::Unlock { at, .. } => at,
        }
    }
}

/// Find the call site on a line, in priority order
///
/// Declarations win over lock calls, lock calls over unlock calls; a line
/// yields at most one site.
pub fn detect(code: &str) -> Option<Site<'_>> {
    if let Some(caps) = DECLARATION_RE.captures(code) {
        let whole = caps.get(0)?;
        return Some(Site::Declaration {
            at: whole.start(),
            name: caps.get(1)?.as_str(),
            args: caps.get(2)?.as_str(),
        });
    }
    if let Some(caps) = LOCK_RE.captures(code) {
        let name = caps.get(1)?;
        return Some(Site::Lock {
            at: name.start(),
            name: name.as_str(),
        });
    }
    if let Some(caps) = UNLOCK_RE.captures(code) {
        let name = caps.get(1)?;
        return Some(Site::Unlock {
            at: name.start(),
            name: name.as_str(),
        });
    }
    None
}

/// Mutex expression and deferral extracted from a constructor argument list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockArguments {
    pub mutex_expr: String,
    pub deferred: bool,
}

/// Split a declaration's argument list
pub fn lock_arguments(args: &str) -> LockArguments {
    let deferred = args.contains(DEFER_SENTINEL);
    let first = args.split(',').next().unwrap_or(args);
    LockArguments {
        mutex_expr: first.trim().to_string(),
        deferred,
    }
}

pub fn is_identifier(text: &str) -> bool {
    IDENTIFIER_RE.is_match(text)
}

/// Distinguishing token for a mutex expression that is not an identifier
///
/// `None` for a bare identifier. Otherwise the segment after the last `->`
/// or `.`, so `this->state.mtx` yields `mtx`.
///
/// # Errors
/// Fails when the expression has neither `->` nor `.`, or ends in one.
pub fn synthetic_id(mutex_expr: &str) -> Result<Option<String>> {
    if is_identifier(mutex_expr) {
        return Ok(None);
    }

    if !mutex_expr.contains("->") && !mutex_expr.contains('.') {
        bail!("Cannot find delimiter in mutex name '{mutex_expr}'");
    }

    let last = mutex_expr
        .rsplit("->")
        .next()
        .and_then(|tail| tail.rsplit('.').next())
        .map(str::trim)
        .unwrap_or_default();
    if last.is_empty() {
        bail!("Cannot derive an identifier from mutex name '{mutex_expr}'");
    }
    Ok(Some(last.to_string()))
}

pub fn is_local_include(code: &str) -> bool {
    LOCAL_INCLUDE_RE.is_match(code)
}

pub fn is_system_include(code: &str) -> bool {
    SYSTEM_INCLUDE_RE.is_match(code)
}

/// Whether an emitted line holds a return statement
pub fn has_return(line: &str) -> bool {
    RETURN_RE.is_match(line)
}
