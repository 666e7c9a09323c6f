//! Instrumentation Engine
//!
//! A single forward pass over the lines of a scanned file. Scope events for a
//! line are applied before its text is examined: opening a scope pushes a
//! symbol table, closing one emits synthetic unlock/destruct statements for
//! the locks that scope owns and pops the table. The line is then matched
//! against the declaration, lock and unlock patterns and rewritten into the
//! corresponding bookkeeping macro.

pub mod patterns;
pub mod vocabulary;

use crate::core::logger::{self, TraceEvent};
use crate::core::scanner::ScopeMap;
use crate::core::tracker::LockStateTracker;
use crate::core::types::{LockRecord, ScopeEvent, SiteKind};
use anyhow::{Context, Result};
use fxhash::FxHashSet;
use patterns::Site;
use serde::Serialize;
use vocabulary::{HEADER_DIRECTIVE, MACRO_PREFIX, Macro};

/// Default indentation per scope level for synthetic statements
pub const DEFAULT_INDENT: &str = "    ";

/// Settings that shape the rewritten text
#[derive(Debug, Clone)]
pub struct InstrumentOptions {
    /// Indentation repeated once per nesting level
    pub indent: String,
    /// Reuse the indentation observed inside a scope when there is one
    pub align: bool,
    /// Append a revert marker to every rewritten line
    pub revert_markers: bool,
    /// Mutex expressions that are never instrumented
    pub excludes: FxHashSet<String>,
}

impl Default for InstrumentOptions {
    fn default() -> Self {
        InstrumentOptions {
            indent: DEFAULT_INDENT.to_string(),
            align: false,
            revert_markers: true,
            excludes: FxHashSet::default(),
        }
    }
}

/// Counters describing what a pass did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct InstrumentStats {
    pub declarations: usize,
    pub locks: usize,
    pub unlocks: usize,
    pub excluded: usize,
    pub synthetic: usize,
}

impl InstrumentStats {
    fn count(&mut self, kind: SiteKind) {
        match kind {
            SiteKind::Declaration => self.declarations += 1,
            SiteKind::Lock => self.locks += 1,
            SiteKind::Unlock => self.unlocks += 1,
        }
    }
}

/// Output of an instrumentation pass
#[derive(Debug, Clone, Default)]
pub struct Instrumented {
    pub lines: Vec<String>,
    pub changed: bool,
    pub stats: InstrumentStats,
}

/// Rewrite the lines of a scanned file
///
/// # Errors
/// Fails when a declaration names a mutex expression that cannot be turned
/// into a bookkeeping token; no partial output is produced in that case.
pub fn instrument(map: &ScopeMap, options: &InstrumentOptions) -> Result<Instrumented> {
    Pass::new(map, options).run()
}

/// State of one forward pass
struct Pass<'a> {
    map: &'a ScopeMap,
    options: &'a InstrumentOptions,
    tracker: LockStateTracker,
    out: Vec<String>,
    changed: bool,
    stats: InstrumentStats,
    /// Output indices of the latest `#include "..."` and `#include <...>`
    last_local_include: Option<usize>,
    last_system_include: Option<usize>,
    /// The last output line is a source line whose code holds a `return`
    return_last: bool,
    /// Line ending appended to lines this pass creates
    eol: &'static str,
    tracing: bool,
}

impl<'a> Pass<'a> {
    fn new(map: &'a ScopeMap, options: &'a InstrumentOptions) -> Self {
        let crlf = map.lines().first().is_some_and(|l| l.ends_with('\r'));
        Pass {
            map,
            options,
            tracker: LockStateTracker::new(),
            out: Vec::with_capacity(map.line_count() + 8),
            changed: false,
            stats: InstrumentStats::default(),
            last_local_include: None,
            last_system_include: None,
            return_last: false,
            eol: if crlf { "\r" } else { "" },
            tracing: logger::is_logging_enabled(),
        }
    }

    fn trace(&self, line: usize, event: TraceEvent) {
        if self.tracing {
            logger::log_event(line, event);
        }
    }

    fn run(mut self) -> Result<Instrumented> {
        let map = self.map;
        for (index, line) in map.lines().iter().enumerate() {
            let events = map.events_on(index);
            for event in events {
                match event {
                    // same-line scopes are not processed
                    ScopeEvent::Paired(..) => {}
                    ScopeEvent::Open(_) => {
                        self.tracker.enter_scope();
                        self.trace(
                            index,
                            TraceEvent::ScopeEntered {
                                depth: self.tracker.depth(),
                            },
                        );
                    }
                    ScopeEvent::Close(_) => self.close_scope(index),
                }
            }

            if events.is_empty() {
                self.tracker.observe_indent(line);
            }

            let code = map.code_on(index);
            if patterns::is_local_include(code) {
                self.last_local_include = Some(self.out.len());
            }
            if patterns::is_system_include(code) {
                self.last_system_include = Some(self.out.len());
            }

            let rewritten = self
                .rewrite(index, line, code)
                .with_context(|| format!("line {}", index + 1))?;
            match rewritten {
                // only the code ahead of the site survives the rewrite
                Some((at, text)) => {
                    self.return_last = patterns::has_return(code.get(..at).unwrap_or(code));
                    self.out.push(text);
                }
                None => {
                    self.return_last = patterns::has_return(code);
                    self.out.push(line.clone());
                }
            }
        }

        if self.changed {
            let at = self
                .last_local_include
                .or(self.last_system_include)
                .map_or(0, |i| i + 1);
            self.out.insert(at, format!("{HEADER_DIRECTIVE}{}", self.eol));
            self.trace(at, TraceEvent::HeaderInserted);
        }
        self.trace(map.line_count(), TraceEvent::PassFinished { stats: self.stats });

        Ok(Instrumented {
            lines: self.out,
            changed: self.changed,
            stats: self.stats,
        })
    }

    /// Emit cleanup for the innermost scope and pop it
    fn close_scope(&mut self, index: usize) {
        let indent = self
            .tracker
            .cleanup_indent(&self.options.indent, self.options.align);
        let depth = self.tracker.depth();
        let Some(table) = self.tracker.exit_scope() else {
            return;
        };
        self.trace(index, TraceEvent::ScopeExited { depth });

        for (_, record) in table.owned() {
            let id = record.synthetic_id.as_deref();
            let before_return = self.return_last;
            if record.locked {
                self.place(&indent, Macro::Unlock.invoke(&record.mutex_expr, id), depth);
            }
            self.place(&indent, Macro::Destruct.invoke(&record.mutex_expr, id), depth);
            self.changed = true;
            self.trace(
                index,
                TraceEvent::CleanupEmitted {
                    mutex: record.mutex_expr.clone(),
                    unlocked: record.locked,
                    before_return,
                },
            );
        }
    }

    /// Append a synthetic statement, or slot it in ahead of a trailing return
    fn place(&mut self, indent: &str, statement: String, depth: usize) {
        let line = format!(
            "{}{}",
            vocabulary::synthetic_statement(indent, &statement, depth),
            self.eol
        );
        match self.out.len() {
            len if self.return_last && len > 0 => self.out.insert(len - 1, line),
            _ => {
                self.out.push(line);
                self.return_last = false;
            }
        }
        self.stats.synthetic += 1;
    }

    /// Rewrite one line into `(site offset, new text)`, or `None` to keep it
    fn rewrite(
        &mut self,
        index: usize,
        line: &str,
        code: &str,
    ) -> Result<Option<(usize, String)>> {
        let Some(site) = patterns::detect(code) else {
            return Ok(None);
        };

        let text = match site {
            Site::Declaration { at, name, args } => self.declaration(index, line, at, name, args)?,
            Site::Lock { at, name } => self.call(index, line, at, name, SiteKind::Lock),
            Site::Unlock { at, name } => self.call(index, line, at, name, SiteKind::Unlock),
        };
        Ok(text.map(|text| (site.at(), text)))
    }

    fn declaration(
        &mut self,
        index: usize,
        line: &str,
        at: usize,
        name: &str,
        args: &str,
    ) -> Result<Option<String>> {
        // a lock at file scope has no scope to clean it up
        if self.tracker.current().is_none() {
            return Ok(None);
        }

        let arguments = patterns::lock_arguments(args);
        let excluded = line.contains(MACRO_PREFIX)
            || self.options.excludes.contains(&arguments.mutex_expr);

        let synthetic_id = if excluded {
            None
        } else {
            patterns::synthetic_id(&arguments.mutex_expr)?
        };

        let mut record = LockRecord::new(
            arguments.mutex_expr.clone(),
            synthetic_id.clone(),
            arguments.deferred,
        );
        record.excluded = excluded;

        self.trace(
            index,
            TraceEvent::LockDeclared {
                name: name.to_string(),
                mutex: arguments.mutex_expr.clone(),
                id: synthetic_id.clone(),
                deferred: arguments.deferred,
                excluded,
            },
        );

        if let Some(table) = self.tracker.current_mut() {
            table.declare(name, record);
        }

        if excluded {
            self.stats.excluded += 1;
            return Ok(None);
        }

        let call = Macro::declaration(arguments.deferred)
            .invoke(&arguments.mutex_expr, synthetic_id.as_deref());
        self.stats.count(SiteKind::Declaration);
        self.changed = true;
        Ok(Some(self.splice(line, at, &call)))
    }

    fn call(
        &mut self,
        index: usize,
        line: &str,
        at: usize,
        name: &str,
        kind: SiteKind,
    ) -> Option<String> {
        let record = self.tracker.lookup_mut(name)?;
        if record.excluded {
            return None;
        }

        let (statement, event) = match kind {
            SiteKind::Unlock => {
                record.locked = false;
                (
                    Macro::Unlock.invoke(&record.mutex_expr, record.synthetic_id.as_deref()),
                    TraceEvent::LockReleased {
                        name: name.to_string(),
                    },
                )
            }
            _ => {
                record.locked = true;
                (
                    Macro::Lock.invoke(&record.mutex_expr, record.synthetic_id.as_deref()),
                    TraceEvent::LockAcquired {
                        name: name.to_string(),
                    },
                )
            }
        };

        self.trace(index, event);
        self.stats.count(kind);
        self.changed = true;
        Some(self.splice(line, at, &statement))
    }

    /// Replace the tail of `line` from byte `at` with `statement`
    ///
    /// The original line is kept verbatim in a revert marker unless markers
    /// are disabled. A trailing `\r` stays at the very end.
    fn splice(&self, line: &str, at: usize, statement: &str) -> String {
        let (body, ending) = match line.strip_suffix('\r') {
            Some(body) => (body, "\r"),
            None => (line, ""),
        };
        let at = at.min(body.len());

        let mut out = String::with_capacity(line.len() * 2 + statement.len() + 8);
        out.push_str(&body[..at]);
        out.push_str(statement);
        if self.options.revert_markers {
            out.push_str(&vocabulary::revert_marker(body));
        }
        out.push_str(ending);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::scanner::scan;

    fn run(src: &str) -> Instrumented {
        instrument(&scan(src), &InstrumentOptions::default()).unwrap()
    }

    #[test]
    fn test_plain_declaration_gets_cleanup() {
        let src = concat!(
            "void f()\n",
            "{\n",
            "    std::unique_lock<std::mutex> lock(m);\n",
            "    work();\n",
            "}\n",
        );
        let result = run(src);
        assert!(result.changed);
        assert_eq!(
            result.lines,
            vec![
                "#include \"Dreadlock.h\"",
                "void f()",
                "{",
                "    DREADLOCK(m); // {{    std::unique_lock<std::mutex> lock(m);}}",
                "    work();",
                "    DREADLOCK_UNLOCK(m);  // aids Dreadlock's bookkeeping 1",
                "    DREADLOCK_DESTRUCT(m);  // aids Dreadlock's bookkeeping 1",
                "}",
            ]
        );
        assert_eq!(result.stats.declarations, 1);
        assert_eq!(result.stats.synthetic, 2);
    }

    #[test]
    fn test_deferred_member_lock_is_never_unlocked() {
        let src = concat!(
            "void f()\n",
            "{\n",
            "    std::unique_lock<std::mutex> lock(obj->mtx, std::defer_lock);\n",
            "}\n",
        );
        let result = run(src);
        assert!(result.lines[3].starts_with("    DREADLOCK_DEFER_ID(obj->mtx, mtx);"));
        assert_eq!(
            result.lines[4],
            "    DREADLOCK_DESTRUCT_ID(obj->mtx, mtx);  // aids Dreadlock's bookkeeping 1"
        );
        assert_eq!(result.lines[5], "}");
        assert!(!result.lines.iter().any(|l| l.contains("DREADLOCK_UNLOCK")));
    }

    #[test]
    fn test_lock_and_unlock_sites_track_state() {
        let src = concat!(
            "void f()\n",
            "{\n",
            "    std::unique_lock<std::mutex> lk(m, std::defer_lock);\n",
            "    lk.lock();\n",
            "    lk.unlock();\n",
            "}\n",
        );
        let result = run(src);
        assert_eq!(
            result.lines[4],
            "    DREADLOCK_LOCK(m); // {{    lk.lock();}}"
        );
        assert_eq!(
            result.lines[5],
            "    DREADLOCK_UNLOCK(m); // {{    lk.unlock();}}"
        );
        // unlocked at scope end, so only the destruct is synthesized
        assert!(result.lines[6].starts_with("    DREADLOCK_DESTRUCT(m);"));
        assert_eq!(result.lines[7], "}");
    }

    #[test]
    fn test_cleanup_goes_before_trailing_return() {
        let src = concat!(
            "int f()\n",
            "{\n",
            "    std::unique_lock<std::mutex> lk(m);\n",
            "    return value;\n",
            "}\n",
        );
        let result = run(src);
        assert!(result.lines[4].starts_with("    DREADLOCK_UNLOCK(m);"));
        assert!(result.lines[5].starts_with("    DREADLOCK_DESTRUCT(m);"));
        assert_eq!(result.lines[6], "    return value;");
        assert_eq!(result.lines[7], "}");
    }

    #[test]
    fn test_excluded_mutex_is_left_alone() {
        let src = "void f()\n{\n    std::unique_lock<std::mutex> lk(io);\n    lk.unlock();\n}\n";
        let mut options = InstrumentOptions::default();
        options.excludes.insert("io".to_string());
        let result = instrument(&scan(src), &options).unwrap();
        assert!(!result.changed);
        assert_eq!(result.stats.excluded, 1);
        let expected: Vec<&str> = src.lines().collect();
        assert_eq!(result.lines, expected);
    }

    #[test]
    fn test_inner_scope_does_not_clean_inherited_lock() {
        let src = concat!(
            "void f()\n",
            "{\n",
            "    std::unique_lock<std::mutex> lk(m);\n",
            "    if (x)\n",
            "    {\n",
            "        y();\n",
            "    }\n",
            "}\n",
        );
        let result = run(src);
        let synthetic: Vec<usize> = result
            .lines
            .iter()
            .enumerate()
            .filter(|(_, l)| l.contains("bookkeeping"))
            .map(|(i, _)| i)
            .collect();
        assert_eq!(synthetic.len(), 2);
        // both after the inner scope's closing brace
        let inner_close = result.lines.iter().position(|l| l == "    }").unwrap();
        assert!(synthetic.iter().all(|&i| i > inner_close));
    }

    #[test]
    fn test_unparseable_mutex_aborts() {
        let src = "void f()\n{\n    std::unique_lock<std::mutex> lk(*ptr);\n}\n";
        let err = instrument(&scan(src), &InstrumentOptions::default()).unwrap_err();
        let message = format!("{err:#}");
        assert!(message.contains("line 3"));
        assert!(message.contains("Cannot find delimiter in mutex name '*ptr'"));
    }

    #[test]
    fn test_commented_declaration_is_ignored() {
        let src = "void f()\n{\n    // std::unique_lock<std::mutex> lk(m);\n}\n";
        let result = run(src);
        assert!(!result.changed);
    }

    #[test]
    fn test_header_follows_last_local_include() {
        let src = concat!(
            "#include <mutex>\n",
            "#include \"a.h\"\n",
            "#include <vector>\n",
            "void f()\n",
            "{\n",
            "    std::unique_lock<std::mutex> lk(m);\n",
            "}\n",
        );
        let result = run(src);
        assert_eq!(result.lines[1], "#include \"a.h\"");
        assert_eq!(result.lines[2], "#include \"Dreadlock.h\"");
    }

    #[test]
    fn test_header_follows_last_system_include() {
        let src = "#include <mutex>\nvoid f()\n{\n    std::unique_lock<std::mutex> lk(m);\n}\n";
        let result = run(src);
        assert_eq!(result.lines[0], "#include <mutex>");
        assert_eq!(result.lines[1], "#include \"Dreadlock.h\"");
    }

    #[test]
    fn test_disabled_revert_markers() {
        let src = "void f()\n{\n    std::unique_lock<std::mutex> lk(m);\n}\n";
        let options = InstrumentOptions {
            revert_markers: false,
            ..InstrumentOptions::default()
        };
        let result = instrument(&scan(src), &options).unwrap();
        assert_eq!(result.lines[3], "    DREADLOCK(m);");
    }

    #[test]
    fn test_align_uses_observed_indentation() {
        let src = "void f()\n{\n\tstd::unique_lock<std::mutex> lk(m);\n}\n";
        let options = InstrumentOptions {
            indent: "  ".to_string(),
            align: true,
            ..InstrumentOptions::default()
        };
        let result = instrument(&scan(src), &options).unwrap();
        assert!(result.lines[4].starts_with("\tDREADLOCK_UNLOCK(m);"));

        let fixed = instrument(
            &scan(src),
            &InstrumentOptions {
                indent: "  ".to_string(),
                ..InstrumentOptions::default()
            },
        )
        .unwrap();
        assert!(fixed.lines[4].starts_with("  DREADLOCK_UNLOCK(m);"));
    }

    #[test]
    fn test_crlf_line_endings_are_kept() {
        let src = "void f()\r\n{\r\n    std::unique_lock<std::mutex> lk(m);\r\n}\r\n";
        let result = run(src);
        assert!(result.lines.iter().all(|l| l.ends_with('\r')));
        assert_eq!(
            result.lines[3],
            "    DREADLOCK(m); // {{    std::unique_lock<std::mutex> lk(m);}}\r"
        );
    }

    #[test]
    fn test_crlf_blank_line_is_not_an_indent() {
        let src = "void f()\r\n{\r\n\r\n    std::unique_lock<std::mutex> lk(m);\r\n}\r\n";
        let options = InstrumentOptions {
            align: true,
            ..InstrumentOptions::default()
        };
        let result = instrument(&scan(src), &options).unwrap();
        assert_eq!(
            result.lines[5],
            "    DREADLOCK_UNLOCK(m);  // aids Dreadlock's bookkeeping 1\r"
        );
        assert_eq!(
            result.lines[6],
            "    DREADLOCK_DESTRUCT(m);  // aids Dreadlock's bookkeeping 1\r"
        );
    }

    #[test]
    fn test_return_in_comment_or_string_is_not_a_return() {
        let src = concat!(
            "void f()\n",
            "{\n",
            "    std::unique_lock<std::mutex> lk(m);\n",
            "    log(\"return\");  // return early?\n",
            "}\n",
        );
        let result = run(src);
        assert_eq!(result.lines[4], "    log(\"return\");  // return early?");
        assert!(result.lines[5].starts_with("    DREADLOCK_UNLOCK(m);"));
        assert!(result.lines[6].starts_with("    DREADLOCK_DESTRUCT(m);"));
    }

    #[test]
    fn test_return_ahead_of_rewritten_call_still_counts() {
        let src = concat!(
            "void f()\n",
            "{\n",
            "    std::unique_lock<std::mutex> lk(m, std::defer_lock);\n",
            "    if (done) return; lk.lock();\n",
            "}\n",
        );
        let result = run(src);
        assert!(result.lines[4].starts_with("    DREADLOCK_UNLOCK(m);"));
        assert!(result.lines[5].starts_with("    DREADLOCK_DESTRUCT(m);"));
        assert!(result.lines[6].starts_with("    if (done) return; DREADLOCK_LOCK(m);"));
    }

    #[test]
    fn test_untracked_lock_call_passes_through() {
        let src = "void f()\n{\n    other.lock();\n}\n";
        let result = run(src);
        assert!(!result.changed);
    }
}
