//! Scope Scanner
//!
//! A single left-to-right pass over the characters of a translation unit that
//! classifies every position as string, comment or code, and collects the
//! brace-delimited scopes found in code into a tree. The tree is then
//! flattened into a line-indexed table of [`ScopeEvent`]s that the rewrite
//! pass consumes in lockstep with the source lines.

use crate::core::types::{Position, Scope, ScopeEvent};
use anyhow::{Context, Result};
use std::fmt::Write as _;
use std::path::Path;

/// Lexical state carried from one character to the next
#[derive(Debug, Default)]
struct CharClassifier {
    in_string: bool,
    string_char: char,
    in_single_comment: bool,
    in_multi_comment: bool,
    /// Countdown armed by a backslash inside a string
    escape: u8,
    last_char: Option<char>,
}

/// What the classifier decided about one character
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CharEffect {
    None,
    /// The character completed a comment opener; the previous character
    /// belongs to the comment too
    CommentStarted,
    OpenBrace,
    CloseBrace,
}

impl CharClassifier {
    fn hidden(&self) -> bool {
        self.in_string || self.in_single_comment || self.in_multi_comment
    }

    fn in_comment(&self) -> bool {
        self.in_single_comment || self.in_multi_comment
    }

    /// Feed one non-newline character and report its structural effect
    fn feed(&mut self, c: char) -> CharEffect {
        let last = self.last_char;
        let mut effect = CharEffect::None;

        match c {
            '\\' => {
                // an escaped backslash does not escape what follows it
                if self.in_string {
                    self.escape = if self.escape == 0 { 2 } else { 0 };
                }
            }
            '/' => {
                if last == Some('/') {
                    if !self.hidden() && self.escape == 0 {
                        self.in_single_comment = true;
                        effect = CharEffect::CommentStarted;
                    }
                } else if last == Some('*') && self.in_multi_comment && !self.in_string {
                    self.in_multi_comment = false;
                }
            }
            '*' => {
                if last == Some('/') && !self.hidden() {
                    self.in_multi_comment = true;
                    effect = CharEffect::CommentStarted;
                }
            }
            '"' | '\'' => {
                if !self.in_comment() && self.escape == 0 {
                    if self.in_string {
                        if self.string_char == c {
                            self.in_string = false;
                        }
                    } else {
                        self.string_char = c;
                        self.in_string = true;
                    }
                }
            }
            '{' => {
                if !self.hidden() && self.escape == 0 {
                    effect = CharEffect::OpenBrace;
                }
            }
            '}' => {
                if !self.hidden() && self.escape == 0 {
                    effect = CharEffect::CloseBrace;
                }
            }
            _ => {}
        }

        if self.escape != 0 {
            self.escape -= 1;
        }
        self.last_char = Some(c);
        effect
    }

    fn newline(&mut self) {
        self.in_single_comment = false;
        self.last_char = Some('\n');
    }
}

/// A scope whose closing brace has not been seen yet
#[derive(Debug)]
struct PendingScope {
    start: Position,
    children: Vec<Scope>,
}

/// Result of scanning one file
///
/// Holds the file re-split into lines, a code mask per line (the line with
/// every string, character literal and comment character blanked out, byte
/// offsets preserved), the scope tree and the line-indexed event table.
#[derive(Debug, Clone, Default)]
pub struct ScopeMap {
    lines: Vec<String>,
    code: Vec<String>,
    scopes: Vec<Scope>,
    events: Vec<Vec<ScopeEvent>>,
}

impl ScopeMap {
    /// The source lines, without their `\n` terminators
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn into_lines(self) -> Vec<String> {
        self.lines
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    /// The code-only rendition of a line; empty past the end of the file
    pub fn code_on(&self, line: usize) -> &str {
        self.code.get(line).map(String::as_str).unwrap_or("")
    }

    /// Scope events recorded on a line, in nesting order
    pub fn events_on(&self, line: usize) -> &[ScopeEvent] {
        self.events.get(line).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Top-level scopes of the file
    pub fn scopes(&self) -> &[Scope] {
        &self.scopes
    }

    /// True when no complete scope was found
    pub fn has_no_scopes(&self) -> bool {
        self.scopes.is_empty()
    }

    /// Render the event table in the same shape the debug flag prints it
    ///
    /// Each line reads `index: [(open, close), ...]`, padded, followed by
    /// `!>` when the line carries events and `->` otherwise, then the text.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (index, line) in self.lines.iter().enumerate() {
            let events: Vec<(isize, isize)> =
                self.events_on(index).iter().map(ScopeEvent::as_columns).collect();
            let mut head = format!("{index}: {events:?}");
            while head.chars().count() < 20 {
                head.push(' ');
            }
            let marker = if events.is_empty() { "->" } else { "!>" };
            let _ = writeln!(out, "{head}{marker} {line}");
        }
        out
    }
}

/// Scan raw file text into lines, code masks and scope events
pub fn scan(text: &str) -> ScopeMap {
    let mut classifier = CharClassifier::default();
    let mut lines = Vec::new();
    let mut code = Vec::new();
    let mut line = String::new();
    let mut mask = String::new();

    let mut line_no = 0usize;
    let mut col_no = 0usize;

    let mut tree: Vec<Scope> = Vec::new();
    let mut stack: Vec<PendingScope> = Vec::new();

    // Byte offset in `mask` where the previous character was written
    let mut last_mask_at = 0usize;

    for c in text.chars() {
        if c == '\n' {
            lines.push(std::mem::take(&mut line));
            code.push(std::mem::take(&mut mask));
            line_no += 1;
            col_no = 0;
            last_mask_at = 0;
            classifier.newline();
            continue;
        }

        let was_hidden = classifier.hidden();
        let effect = classifier.feed(c);

        match effect {
            CharEffect::CommentStarted => {
                // the opener's first character was written as code
                let width = mask.len() - last_mask_at;
                mask.truncate(last_mask_at);
                mask.extend(std::iter::repeat_n(' ', width));
            }
            CharEffect::OpenBrace => stack.push(PendingScope {
                start: Position::new(line_no, col_no),
                children: Vec::new(),
            }),
            CharEffect::CloseBrace => {
                // an unmatched closing brace is not an error
                if let Some(pending) = stack.pop() {
                    let scope = Scope {
                        start: pending.start,
                        end: Position::new(line_no, col_no),
                        children: pending.children,
                    };
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(scope),
                        None => tree.push(scope),
                    }
                }
            }
            CharEffect::None => {}
        }

        last_mask_at = mask.len();
        if was_hidden || classifier.hidden() {
            mask.extend(std::iter::repeat_n(' ', c.len_utf8()));
        } else {
            mask.push(c);
        }
        line.push(c);
        col_no += 1;
    }

    if !line.is_empty() {
        lines.push(line);
        code.push(mask);
    }

    // scopes left on the stack never closed and are not reported
    let mut events = vec![Vec::new(); lines.len()];
    for scope in &tree {
        flatten(scope, &mut events);
    }

    ScopeMap {
        lines,
        code,
        scopes: tree,
        events,
    }
}

/// Read and scan a file from disk
pub fn scan_file<P: AsRef<Path>>(path: P) -> Result<ScopeMap> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read '{}'", path.display()))?;
    Ok(scan(&text))
}

/// Emit a scope and then its children into the line table
fn flatten(scope: &Scope, events: &mut [Vec<ScopeEvent>]) {
    let (start, end) = (scope.start, scope.end);
    if scope.is_single_line() {
        if let Some(slot) = events.get_mut(start.line) {
            slot.push(ScopeEvent::Paired(start.col, end.col));
        }
    } else {
        if let Some(slot) = events.get_mut(start.line) {
            slot.push(ScopeEvent::Open(start.col));
        }
        if let Some(slot) = events.get_mut(end.line) {
            slot.push(ScopeEvent::Close(end.col));
        }
    }

    for child in &scope.children {
        flatten(child, events);
    }
}
