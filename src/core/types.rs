/// A 0-based `(line, column)` coordinate in the scanned text
///
/// Columns count characters of the newline-stripped line, not bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Position {
    pub line: usize,
    pub col: usize,
}

impl Position {
    pub fn new(line: usize, col: usize) -> Self {
        Position { line, col }
    }
}

/// A node in the brace-nesting tree
///
/// `start` is the position of the opening `{`, `end` the position of the
/// matching `}`. Children are kept in source order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scope {
    pub start: Position,
    pub end: Position,
    pub children: Vec<Scope>,
}

impl Scope {
    /// True when the scope opens and closes on the same line
    pub fn is_single_line(&self) -> bool {
        self.start.line == self.end.line
    }
}

/// A scope boundary recorded against one line of the file
///
/// Multi-line scopes produce an `Open` on their first line and a `Close` on
/// their last line, so that the rewrite pass can react to each independently.
/// Single-line scopes produce one `Paired` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeEvent {
    /// A scope opens at this column and closes on a later line
    Open(usize),
    /// A scope opened on an earlier line closes at this column
    Close(usize),
    /// A scope opens and closes on this line
    Paired(usize, usize),
}

impl ScopeEvent {
    /// The `(open_col, close_col)` pair with `-1` marking the missing side
    pub fn as_columns(&self) -> (isize, isize) {
        match *self {
            ScopeEvent::Open(col) => (col as isize, -1),
            ScopeEvent::Close(col) => (-1, col as isize),
            ScopeEvent::Paired(open, close) => (open as isize, close as isize),
        }
    }
}

/// Tracked metadata for one lock variable visible in a scope
///
/// Records are created when a `std::unique_lock` declaration is recognized,
/// mutated by later `.lock()`/`.unlock()` sites in the same scope, and
/// dropped together with the symbol table of the scope that owns them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockRecord {
    /// Text of the wrapped mutex expression (`m`, `obj->m`, `obj.m`)
    pub mutex_expr: String,

    /// Trailing member name, present only when `mutex_expr` is not a bare
    /// identifier. Used as the distinguishing token of the `_ID` macros.
    pub synthetic_id: Option<String>,

    /// Constructed with `std::defer_lock`
    pub deferred: bool,

    /// Known to be held at the current point of the scan
    pub locked: bool,

    /// Copied down from an enclosing scope rather than declared here.
    /// Only the owning scope emits cleanup for a record.
    pub inherited: bool,

    /// Not instrumented: the mutex is in the exclusion set, or the line
    /// already carried instrumentation
    pub excluded: bool,
}

impl LockRecord {
    /// Create a record for a freshly declared lock
    ///
    /// A deferred lock starts unlocked, any other lock starts held.
    pub fn new(mutex_expr: impl Into<String>, synthetic_id: Option<String>, deferred: bool) -> Self {
        LockRecord {
            mutex_expr: mutex_expr.into(),
            synthetic_id,
            deferred,
            locked: !deferred,
            inherited: false,
            excluded: false,
        }
    }

    /// Copy of this record as seen from a nested scope
    pub fn inherit(&self) -> Self {
        LockRecord {
            inherited: true,
            ..self.clone()
        }
    }

    /// Whether closing the scope that holds this record must emit cleanup
    pub fn needs_cleanup(&self) -> bool {
        !self.inherited && !self.excluded
    }
}

/// Category of a recognized call site on a line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SiteKind {
    /// `std::unique_lock<...> name(args);`
    Declaration,
    /// `name.lock();`
    Lock,
    /// `name.unlock();`
    Unlock,
}
