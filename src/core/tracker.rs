//! Lock State Tracker
//!
//! Follows the lifetime of `std::unique_lock` variables across nested blocks.
//! The tracker is an explicit stack of symbol tables, one per open brace
//! scope. Entering a scope pushes a copy of the enclosing table with every
//! entry flagged as inherited; leaving a scope pops exactly one table and
//! hands it back so the caller can emit cleanup for the records it owns.

use crate::core::types::LockRecord;
use fxhash::FxHashMap;

/// Lock variables visible in one scope, keyed by variable name
///
/// Iteration follows the order in which names were first declared, which is
/// the order cleanup statements are emitted in.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    order: Vec<String>,
    records: FxHashMap<String, LockRecord>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of this table as seen from a nested scope
    pub fn inherited_copy(&self) -> Self {
        SymbolTable {
            order: self.order.clone(),
            records: self
                .records
                .iter()
                .map(|(name, record)| (name.clone(), record.inherit()))
                .collect(),
        }
    }

    /// Register a record, replacing any record of the same name
    pub fn declare(&mut self, name: impl Into<String>, record: LockRecord) {
        let name = name.into();
        if !self.records.contains_key(&name) {
            self.order.push(name.clone());
        }
        self.records.insert(name, record);
    }

    pub fn get(&self, name: &str) -> Option<&LockRecord> {
        self.records.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut LockRecord> {
        self.records.get_mut(name)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records in declaration order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &LockRecord)> {
        self.order
            .iter()
            .filter_map(|name| self.records.get(name).map(|r| (name.as_str(), r)))
    }

    /// Records this scope must clean up when it closes
    pub fn owned(&self) -> impl Iterator<Item = (&str, &LockRecord)> {
        self.iter().filter(|(_, record)| record.needs_cleanup())
    }
}

/// Stack of symbol tables plus the per-scope indentation observed so far
#[derive(Debug, Clone)]
pub struct LockStateTracker {
    tables: Vec<SymbolTable>,
    /// Leading whitespace of the first plain line seen at each depth.
    /// Slot 0 belongs to file scope, so this is always one longer than
    /// `tables`.
    indents: Vec<String>,
}

impl Default for LockStateTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl LockStateTracker {
    pub fn new() -> Self {
        LockStateTracker {
            tables: Vec::new(),
            indents: vec![String::new()],
        }
    }

    /// Current brace nesting depth
    pub fn depth(&self) -> usize {
        self.tables.len()
    }

    /// Push a table for a newly opened scope
    pub fn enter_scope(&mut self) {
        let table = match self.tables.last() {
            Some(parent) => parent.inherited_copy(),
            None => SymbolTable::new(),
        };
        self.tables.push(table);
        self.indents.push(String::new());
    }

    /// Pop the table of the scope being closed
    ///
    /// Returns `None` at file scope, where there is nothing to pop.
    pub fn exit_scope(&mut self) -> Option<SymbolTable> {
        let table = self.tables.pop()?;
        self.indents.pop();
        Some(table)
    }

    /// Table of the innermost open scope
    pub fn current(&self) -> Option<&SymbolTable> {
        self.tables.last()
    }

    pub fn current_mut(&mut self) -> Option<&mut SymbolTable> {
        self.tables.last_mut()
    }

    /// Look up a lock variable in the innermost scope
    pub fn lookup_mut(&mut self, name: &str) -> Option<&mut LockRecord> {
        self.tables.last_mut()?.get_mut(name)
    }

    /// Remember the indentation of a plain line for the current depth
    ///
    /// Only the first non-empty indentation seen at a depth is kept. Blank
    /// lines, including a lone `\r`, say nothing about indentation.
    pub fn observe_indent(&mut self, line: &str) {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.trim().is_empty() {
            return;
        }
        if let Some(slot) = self.indents.last_mut()
            && slot.is_empty()
        {
            *slot = line
                .chars()
                .take_while(|c| c.is_whitespace())
                .collect();
        }
    }

    /// Indentation for synthetic statements of the innermost scope
    ///
    /// `unit` repeated once per nesting level, or with `align` set, the
    /// indentation observed in the scope when there is one.
    pub fn cleanup_indent(&self, unit: &str, align: bool) -> String {
        if align
            && let Some(observed) = self.indents.last()
            && !observed.is_empty()
        {
            return observed.clone();
        }
        unit.repeat(self.depth())
    }
}
