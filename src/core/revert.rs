//! Revert Engine
//!
//! Restores a previously instrumented file line by line from the revert
//! markers embedded in it. Neither the scanner nor the tracker is needed:
//! rewritten lines carry their original text, synthetic lines carry a macro
//! call and no marker, and the header directive is recognizable on its own.

use crate::core::instrument::vocabulary::{REVERT_CLOSE, REVERT_LEAD, REVERT_OPEN};
use crate::core::logger::{self, TraceEvent};
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref HEADER_RE: Regex = Regex::new(r#"^\s*#\s*include\s*"Dreadlock\.h""#)
        .unwrap_or_else(|e| panic!("regex: {e}"));
    static ref MACRO_CALL_RE: Regex =
        Regex::new(r"\bDREADLOCK(?:_[A-Z_]+)?\s*\(").unwrap_or_else(|e| panic!("regex: {e}"));
}

/// Output of a revert pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reverted {
    pub lines: Vec<String>,
    /// Lines restored from a revert marker
    pub restored: usize,
    /// Synthetic statements and header directives removed
    pub dropped: usize,
}

impl Reverted {
    /// True when at least one revert marker was found
    ///
    /// A file without markers is reported as such rather than as unchanged:
    /// it may have been instrumented with markers disabled.
    pub fn found_markers(&self) -> bool {
        self.restored > 0
    }
}

/// What to do with one instrumented line
#[derive(Debug, PartialEq, Eq)]
enum LineAction<'a> {
    Keep,
    Drop,
    Restore(&'a str),
}

fn classify(line: &str) -> LineAction<'_> {
    if HEADER_RE.is_match(line) {
        return LineAction::Drop;
    }

    let Some(call) = MACRO_CALL_RE.find(line) else {
        return LineAction::Keep;
    };

    let body = line.strip_suffix('\r').unwrap_or(line);
    let tail = &body[call.start()..];
    match (tail.find(REVERT_LEAD), body.rfind(REVERT_CLOSE)) {
        (Some(lead), Some(close)) => {
            let open = call.start() + lead + REVERT_LEAD.len() - REVERT_OPEN.len();
            let start = open + REVERT_OPEN.len();
            if close >= start {
                LineAction::Restore(&body[start..close])
            } else {
                LineAction::Drop
            }
        }
        // a macro call without a marker was synthesized
        _ => LineAction::Drop,
    }
}

/// Restore original text from an instrumented file's lines
pub fn revert<S: AsRef<str>>(lines: &[S]) -> Reverted {
    let tracing = logger::is_logging_enabled();
    let mut result = Reverted::default();

    for (index, line) in lines.iter().enumerate() {
        let line = line.as_ref();
        match classify(line) {
            LineAction::Keep => result.lines.push(line.to_string()),
            LineAction::Drop => {
                result.dropped += 1;
                if tracing {
                    logger::log_event(index, TraceEvent::SyntheticDropped);
                }
            }
            LineAction::Restore(original) => {
                let ending = if line.ends_with('\r') { "\r" } else { "" };
                result.lines.push(format!("{original}{ending}"));
                result.restored += 1;
                if tracing {
                    logger::log_event(index, TraceEvent::LineReverted);
                }
            }
        }
    }

    result
}

/// Revert the full text of an instrumented file
///
/// Lines are split on `\n` only so that `\r` survives the round trip.
pub fn revert_source(text: &str) -> Reverted {
    let mut lines: Vec<&str> = text.split('\n').collect();
    if text.is_empty() || text.ends_with('\n') {
        lines.pop();
    }
    revert(&lines)
}
