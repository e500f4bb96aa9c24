use std::fmt;

use strum::{Display, EnumString, IntoStaticStr};

/// Result type alias for operations that can raise a script-level error.
pub type RunResult<T> = Result<T, ScriptError>;

/// Classification of runtime failures.
///
/// Uses strum derives so the kind name printed to scripts and hosts matches
/// the variant name exactly (e.g. `ArgumentError`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr)]
pub enum ErrorKind {
    /// Wrong arity, wrong operand kind, wrong dtype.
    ArgumentError,
    /// Out-of-range integer index.
    IndexError,
    /// Missing map key.
    KeyError,
    /// Operation not supported for the value's container kind / data type.
    TypeError,
    /// Distinguished marker used by iterators; caught by iteration machinery.
    StopIteration,
    /// From `assert`.
    AssertionError,
    /// From `raise` and `Exception(...)` values crossing `try`/`except`.
    UserException,
    /// From the host boundary: init failures, module load failures.
    StatusError,
}

/// A runtime error carrying its kind, message, and (once known) the source line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptError {
    pub kind: ErrorKind,
    pub message: String,
    /// Line number of the statement the error surfaced in, set exactly once
    /// while unwinding.
    pub line: Option<u32>,
    /// Integer status code, meaningful only for `StatusError`.
    pub code: i32,
}

impl ScriptError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            line: None,
            code: 0,
        }
    }

    pub fn argument(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ArgumentError, message)
    }

    pub fn index(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::IndexError, message)
    }

    pub fn key(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::KeyError, message)
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TypeError, message)
    }

    pub fn stop_iteration() -> Self {
        Self::new(ErrorKind::StopIteration, "StopIteration")
    }

    pub fn assertion(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::AssertionError, message)
    }

    pub fn user(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::UserException, message)
    }

    pub fn status(code: i32, message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::StatusError,
            message: message.into(),
            line: None,
            code,
        }
    }

    /// Annotates the error with the line number of the failing statement.
    ///
    /// The first statement to observe the error wins; nested bodies re-throw
    /// without re-annotating. The message itself stays pristine so a
    /// `try`/`except` handler binds the raw text; the host-facing rendering
    /// ([`fmt::Display`]) carries the `lineNo=` prefix.
    #[must_use]
    pub fn with_line(mut self, line: u32) -> Self {
        if self.line.is_none() {
            self.line = Some(line);
        }
        self
    }

    /// Whether this is the iterator-exhaustion marker.
    pub fn is_stop_iteration(&self) -> bool {
        self.kind == ErrorKind::StopIteration
    }
}

impl fmt::Display for ScriptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "{}: lineNo={line}, {}", self.kind, self.message),
            None => write!(f, "{}: {}", self.kind, self.message),
        }
    }
}

impl std::error::Error for ScriptError {}

/// Builds the "operation not supported" error shared by every kind-dispatch
/// dead end: names the operation, the container kind, and the data type.
pub(crate) fn unsupported(op: &str, container: &str, dtype: &str) -> ScriptError {
    ScriptError::type_error(format!("{op} not supported for variable {container}({dtype})"))
}

/// Builds the fixed-arity mismatch error used by member-function dispatch.
pub(crate) fn arg_count(func: &str, expected: usize, given: usize) -> ScriptError {
    ScriptError::argument(format!("{func} expects {expected} argument(s), {given} given"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_annotation_applies_once() {
        let err = ScriptError::type_error("bad").with_line(3).with_line(7);
        assert_eq!(err.line, Some(3));
        assert_eq!(err.message, "bad");
        assert_eq!(err.to_string(), "TypeError: lineNo=3, bad");
    }

    #[test]
    fn kind_names_match_variant_names() {
        assert_eq!(ErrorKind::ArgumentError.to_string(), "ArgumentError");
        assert_eq!("StopIteration".parse::<ErrorKind>().unwrap(), ErrorKind::StopIteration);
    }
}
