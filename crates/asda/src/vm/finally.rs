//! Finally-state stack machine, backing the `FS_*` op family.
//!
//! A finally-state record captures what should happen once the `finally`
//! body that guards it finishes running: resume normally, re-raise an
//! error, complete a deferred `return`, or resume a deferred jump
//! (`break`/`continue` out of the protected region). `FS_APPLY` consumes
//! the record and enacts it.

use crate::heap::Value;

#[derive(Debug)]
pub enum FinallyState {
    Ok,
    /// Holds the bound error object (as popped off the operand stack by
    /// `FS_ERROR`); re-thrown verbatim when `FS_APPLY` enacts this record.
    Error(Value),
    ValueReturn(Value),
    Jump(usize),
}
