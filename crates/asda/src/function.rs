//! Function objects and partial application.
//!
//! The closed set of callable payload kinds maps directly onto a Rust enum,
//! so there's no callback indirection to thread through — `vm::dispatch`
//! matches on the kind directly when it executes `CALLFUNC`.

use std::rc::Rc;

use crate::bytecode::code::Code;
use crate::heap::{ObjectId, Value};
use crate::scope::Scope;
use crate::types::Type;

/// The two concrete kinds of callable user data.
#[derive(Debug)]
pub enum FunctionObj {
    /// Wraps a code body plus the scope it was defined in. Calling it
    /// creates a child scope, copies the arguments into that scope's first
    /// slots, and runs the code body against it.
    ///
    /// `types` is the declaring module's type list, needed to resolve the
    /// `TypeRef::Module` indices embedded in this code's own ops
    /// (`GETATTR`/`SETATTR`/`CALLCONSTRUCTOR`/`SETMETHODS2CLASS`/`EH_ADD`).
    Asda {
        code: Rc<Code>,
        def_scope: Scope,
        types: Rc<[Rc<Type>]>,
        /// The declaring module's full function list, needed to resolve
        /// `CREATEFUNC`'s `func_index` for any nested function literal this
        /// code itself creates.
        functions: Rc<[Rc<Code>]>,
    },
    /// Wraps an inner function plus a captured argument prefix. Calling it
    /// concatenates the captured prefix with the call's own arguments and
    /// forwards to the inner function.
    Partial { inner: Value, captured: Vec<Value> },
}

impl FunctionObj {
    /// Partial application: prepend `prefix` to `inner`'s eventual argument
    /// list. An empty prefix is a no-op identity, signalled by returning
    /// `None` so the caller can reuse `inner` directly (refcount-incremented)
    /// instead of allocating a new wrapper object.
    #[must_use]
    pub fn make_partial(inner: Value, prefix: Vec<Value>) -> Option<Self> {
        if prefix.is_empty() {
            None
        } else {
            Some(Self::Partial { inner, captured: prefix })
        }
    }

    pub(crate) fn enqueue_children(&self, stack: &mut Vec<ObjectId>) {
        match self {
            Self::Asda { .. } => {
                // `def_scope` is owned via `Rc`, not the manual arena; its
                // own locals are decrefed explicitly by the call frame that
                // owns them (see vm::dispatch's frame teardown) rather than
                // walked here.
            }
            Self::Partial { inner, captured } => {
                if let Value::Object(id) = inner {
                    stack.push(*id);
                }
                for arg in captured {
                    if let Value::Object(id) = arg {
                        stack.push(*id);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_prefix_partial_is_identity() {
        let inner = Value::SmallInt(7); // stand-in identity for this unit test
        assert!(FunctionObj::make_partial(inner, Vec::new()).is_none());
    }

    #[test]
    fn nonempty_prefix_builds_partial_wrapper() {
        let inner = Value::SmallInt(7);
        let partial = FunctionObj::make_partial(inner, vec![Value::SmallInt(1)]);
        assert!(matches!(partial, Some(FunctionObj::Partial { .. })));
    }
}
