//! Error taxonomy: the closed set of built-in error kinds plus an escape
//! hatch for user-defined error classes, and the `RunError`/`ExcType` split
//! that keeps a catchable exception distinct from an internal failure mode.

use std::rc::Rc;

use crate::types::Type;

/// The closed set of built-in error kinds, plus an escape hatch for
/// user-defined `asda-class` types that are raised as errors.
///
/// Mirrors the built-in type table's error entries: `error`, `nomem-error`,
/// `variable-error`, `value-error`, `os-error`, and any user-declared class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExcType {
    /// The generic `error` base type. A handler declared against this
    /// catches any thrown error, built-in or user-defined.
    Error,
    /// Allocation failure. Always carried by the single static nomem-error
    /// object (heap.rs) rather than a fresh allocation.
    NoMem,
    Variable,
    Value,
    Os,
    /// A user-defined subclass of `error`, identified by its class type.
    ///
    /// The wire format gives asda-class descriptors no explicit base-type
    /// edge, so exact-type matching plus `ExcType::Error` as a catch-all is
    /// the only compatibility rule available; see DESIGN.md.
    User(Rc<Type>),
}

impl ExcType {
    /// Returns the display name used in the driver's `<type>: <message>` line.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Error => "error",
            Self::NoMem => "nomem-error",
            Self::Variable => "variable-error",
            Self::Value => "value-error",
            Self::Os => "os-error",
            Self::User(ty) => ty.class_name(),
        }
    }

    /// Assignment-compatibility check used by the error-handler search: is a
    /// value of `thrown` type catchable by a handler declared for `self`?
    #[must_use]
    pub fn catches(&self, thrown: &ExcType) -> bool {
        match self {
            Self::Error => true,
            Self::User(a) => matches!(thrown, Self::User(b) if Rc::ptr_eq(a, b)),
            other => other == thrown,
        }
    }

    #[must_use]
    pub fn value_error(msg: impl Into<String>) -> RunError {
        RunError::Exc(ExcValue {
            exc_type: ExcType::Value,
            message: msg.into(),
        })
    }

    #[must_use]
    pub fn variable_error(msg: impl Into<String>) -> RunError {
        RunError::Exc(ExcValue {
            exc_type: ExcType::Variable,
            message: msg.into(),
        })
    }

    #[must_use]
    pub fn os_error(msg: impl Into<String>) -> RunError {
        RunError::Exc(ExcValue {
            exc_type: ExcType::Os,
            message: msg.into(),
        })
    }

    #[must_use]
    pub fn nomem_error() -> RunError {
        RunError::Exc(ExcValue {
            exc_type: ExcType::NoMem,
            message: "not enough memory".to_owned(),
        })
    }

    #[must_use]
    pub fn user_error(ty: Rc<Type>, msg: impl Into<String>) -> RunError {
        RunError::Exc(ExcValue {
            exc_type: ExcType::User(ty),
            message: msg.into(),
        })
    }
}

/// A thrown error value: its type tag plus a rendered message.
///
/// This is deliberately simpler than a full heap-allocated error object: the
/// message doesn't need to be inspectable as an asda string at runtime, only
/// to reach the driver's final diagnostic line.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{}: {message}", exc_type.name())]
pub struct ExcValue {
    pub exc_type: ExcType,
    pub message: String,
}

/// Outcome of any fallible runtime operation.
///
/// Kept as a two-variant enum (rather than folding straight into `ExcValue`)
/// so that future internal-only failure modes (e.g. decode errors that never
/// reach a handler) have a slot alongside the catchable-exception case.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RunError {
    #[error(transparent)]
    Exc(#[from] ExcValue),
}

impl RunError {
    #[must_use]
    pub fn exc_type(&self) -> &ExcType {
        match self {
            Self::Exc(v) => &v.exc_type,
        }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::Exc(v) => &v.message,
        }
    }

    /// The driver's one-line diagnostic: `<error-type-name>: <message>`.
    #[must_use]
    pub fn diagnostic_line(&self) -> String {
        match self {
            Self::Exc(v) => format!("{}: {}", v.exc_type.name(), v.message),
        }
    }
}

pub type RunResult<T> = Result<T, RunError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_catches_anything() {
        assert!(ExcType::Error.catches(&ExcType::Value));
        assert!(ExcType::Error.catches(&ExcType::NoMem));
    }

    #[test]
    fn specific_handler_does_not_catch_other_specific_type() {
        assert!(!ExcType::Variable.catches(&ExcType::Value));
    }

    #[test]
    fn specific_handler_catches_exact_match() {
        assert!(ExcType::Value.catches(&ExcType::Value));
    }

    #[test]
    fn diagnostic_line_format() {
        let err = ExcType::value_error("bad thing");
        assert_eq!(err.diagnostic_line(), "value-error: bad thing");
    }
}
