//! Lexical scope chain.
//!
//! A scope is an array of local slots plus an owned, level-indexed array of
//! ancestor scopes — not a single parent pointer — so that `get_for_level`
//! is O(1) regardless of nesting depth. This is the closure capture
//! mechanism: a function stores the scope it was *defined* in, and calling
//! it builds a fresh child scope whose ancestor array is that definition
//! scope's own ancestor array plus the definition scope itself.

use std::cell::RefCell;
use std::rc::Rc;

use crate::exceptions::{ExcType, RunResult};
use crate::heap::{Heap, Value};

struct ScopeData {
    /// This scope's own lexical level (0 = global/builtin scope).
    level: usize,
    /// Ancestor scopes indexed by level: `ancestors[L]` is the scope at
    /// level `L`, for `L` in `0..level`.
    ancestors: Vec<Scope>,
    locals: RefCell<Vec<Option<Value>>>,
}

/// A cheaply-cloned handle to a scope; cloning shares the same locals.
#[derive(Clone)]
pub struct Scope(Rc<ScopeData>);

impl Scope {
    /// Builds the level-0 global/builtin scope.
    #[must_use]
    pub fn new_global(nlocals: usize) -> Self {
        Self(Rc::new(ScopeData {
            level: 0,
            ancestors: Vec::new(),
            locals: RefCell::new(vec![None; nlocals]),
        }))
    }

    /// Builds a new child scope one level below `self`, with `nlocals` fresh
    /// (unset) local slots. Used both for a function call's frame and for
    /// any nested lexical block the bytecode declares.
    #[must_use]
    pub fn child(&self, nlocals: usize) -> Self {
        let mut ancestors = self.0.ancestors.clone();
        ancestors.push(self.clone());
        Self(Rc::new(ScopeData {
            level: self.0.level + 1,
            ancestors,
            locals: RefCell::new(vec![None; nlocals]),
        }))
    }

    #[must_use]
    pub fn level(&self) -> usize {
        self.0.level
    }

    /// Returns the scope at lexical level `level`: itself if `level` equals
    /// its own, otherwise the matching ancestor. This is `get-for-level(L)`.
    ///
    /// # Panics
    /// Panics if `level` exceeds this scope's own level — that would be a
    /// bytecode-decoder bug (an out-of-range level byte), not a runtime
    /// condition callers should recover from.
    #[must_use]
    pub fn get_for_level(&self, level: usize) -> Scope {
        if level == self.0.level {
            self.clone()
        } else {
            self.0.ancestors[level].clone()
        }
    }

    #[must_use]
    pub fn local_count(&self) -> usize {
        self.0.locals.borrow().len()
    }

    /// Reads local slot `index`, decref-free (the caller is expected to
    /// `dup_with_heap` if it wants an owned reference).
    ///
    /// # Errors
    /// Returns a `variable-error` if the slot is unset.
    pub fn get_local(&self, index: usize) -> RunResult<Value> {
        self.0.locals.borrow()[index]
            .ok_or_else(|| ExcType::variable_error(format!("local variable {index} is not set")))
    }

    /// Overwrites local slot `index`, returning the previous occupant (if
    /// any) so the caller can decref it.
    pub fn set_local(&self, index: usize, value: Value) -> Option<Value> {
        self.0.locals.borrow_mut()[index].replace(value)
    }

    /// Takes every local slot, decrefing each set value. Used at module
    /// teardown to release a module's exported top-level variables.
    pub fn clear_locals(&self, heap: &mut Heap) {
        for slot in self.0.locals.borrow_mut().drain(..) {
            if let Some(value) = slot {
                value.drop_with_heap(heap);
            }
        }
    }
}
