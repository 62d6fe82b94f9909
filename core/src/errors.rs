//! Runtime errors.
//!
//! Errors travel two ways: as the `Err` side of a [`Result`], and attached to
//! a [`Value`](crate::Value) as data (errors-as-values). Both use the same
//! [`Error`] type so a host can move between them freely.
//!
//! # Error Categories
//!
//! - **Recoverable errors**: everything except [`ErrorKind::Assertion`]. These
//!   are routed through scope error handlers.
//!
//! - **Assertions**: internal invariant breaks (using a destroyed scope,
//!   rebinding a positional parameter). They bypass handlers and always
//!   surface as `Err`.

use core::fmt;

use crate::source::SourceSegment;
use crate::types::Type;

pub type Result<T, E = Error> = core::result::Result<T, E>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidCast,
    InvalidOperation,
    VariableNotFound,
    Readonly,
    ConcurrencyViolation,
    PurityViolation,
    ConstraintViolation,
    ExcessiveRecursion,
    Timeout,
    /// Failure raised by host or user code.
    Exception,
    Assertion,
}

impl ErrorKind {
    /// Name bound to the `type` parameter of error handlers.
    pub fn name(self) -> &'static str {
        match self {
            ErrorKind::InvalidCast => "INVALID_CAST",
            ErrorKind::InvalidOperation => "INVALID_OPERATION",
            ErrorKind::VariableNotFound => "VARIABLE_NOT_FOUND",
            ErrorKind::Readonly => "READONLY",
            ErrorKind::ConcurrencyViolation => "CONCURRENCY_VIOLATION",
            ErrorKind::PurityViolation => "PURITY_VIOLATION",
            ErrorKind::ConstraintViolation => "CONSTRAINT_VIOLATION",
            ErrorKind::ExcessiveRecursion => "EXCESSIVE_RECURSION",
            ErrorKind::Timeout => "TIMEOUT",
            ErrorKind::Exception => "EXCEPTION",
            ErrorKind::Assertion => "ASSERTION",
        }
    }

    /// Short code used by renderers, e.g. `D007`.
    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::InvalidCast => "D001",
            ErrorKind::InvalidOperation => "D002",
            ErrorKind::VariableNotFound => "D003",
            ErrorKind::Readonly => "D004",
            ErrorKind::ConcurrencyViolation => "D005",
            ErrorKind::PurityViolation => "D006",
            ErrorKind::ConstraintViolation => "D007",
            ErrorKind::ExcessiveRecursion => "D008",
            ErrorKind::Timeout => "D009",
            ErrorKind::Exception => "D010",
            ErrorKind::Assertion => "D011",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        const KINDS: [ErrorKind; 11] = [
            ErrorKind::InvalidCast,
            ErrorKind::InvalidOperation,
            ErrorKind::VariableNotFound,
            ErrorKind::Readonly,
            ErrorKind::ConcurrencyViolation,
            ErrorKind::PurityViolation,
            ErrorKind::ConstraintViolation,
            ErrorKind::ExcessiveRecursion,
            ErrorKind::Timeout,
            ErrorKind::Exception,
            ErrorKind::Assertion,
        ];
        KINDS.into_iter().find(|kind| kind.name() == name)
    }

    /// Whether scope error handlers may intercept this kind.
    pub fn is_recoverable(self) -> bool {
        !matches!(self, ErrorKind::Assertion)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ErrorKind::InvalidCast => "Invalid cast",
            ErrorKind::InvalidOperation => "Invalid operation",
            ErrorKind::VariableNotFound => "Variable not found",
            ErrorKind::Readonly => "Readonly violation",
            ErrorKind::ConcurrencyViolation => "Concurrency violation",
            ErrorKind::PurityViolation => "Purity violation",
            ErrorKind::ConstraintViolation => "Constraint violation",
            ErrorKind::ExcessiveRecursion => "Excessive recursion",
            ErrorKind::Timeout => "Timeout",
            ErrorKind::Exception => "Exception",
            ErrorKind::Assertion => "Assertion failed",
        };
        f.write_str(text)
    }
}

/// A runtime error with the chain of source fragments it passed through.
///
/// `sources` runs from the innermost fragment (where the error was raised)
/// outwards. Each fragment appears once, identified by its short hash.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct Error {
    kind: ErrorKind,
    message: String,
    sources: Vec<SourceSegment>,
}

impl Error {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            sources: Vec::new(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn sources(&self) -> &[SourceSegment] {
        &self.sources
    }

    /// Records that the error passed through `source`. Repeats are ignored.
    pub fn add_source(&mut self, source: SourceSegment) {
        if !self.sources.iter().any(|s| s.short_hash() == source.short_hash()) {
            self.sources.push(source);
        }
    }

    pub fn with_source(mut self, source: SourceSegment) -> Self {
        self.add_source(source);
        self
    }

    pub fn invalid_cast(from: Type, to: Type) -> Self {
        Self::new(
            ErrorKind::InvalidCast,
            format!("Cannot cast {} to {}", from, to),
        )
    }

    pub fn invalid_operation(operation: &str, ty: Type) -> Self {
        Self::new(
            ErrorKind::InvalidOperation,
            format!("Cannot apply '{}' to {}", operation, ty),
        )
    }

    pub fn invalid_operands(operation: &str, left: Type, right: Type) -> Self {
        Self::new(
            ErrorKind::InvalidOperation,
            format!("Cannot apply '{}' to {} and {}", operation, left, right),
        )
    }

    pub fn variable_not_found(name: &str, scope: &str) -> Self {
        Self::new(
            ErrorKind::VariableNotFound,
            format!("Variable '{}' not found in {}", name, scope),
        )
    }

    pub fn readonly(name: &str) -> Self {
        Self::new(
            ErrorKind::Readonly,
            format!("Cannot change the value of readonly variable '{}'", name),
        )
    }

    pub fn excessive_recursion(depth: usize, max_depth: usize) -> Self {
        Self::new(
            ErrorKind::ExcessiveRecursion,
            format!(
                "Excessive recursion detected: depth {} exceeds maximum of {}",
                depth, max_depth
            ),
        )
    }

    pub fn assertion(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Assertion, message)
    }

    pub fn exception(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Exception, message)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::exception(format!("Invalid JSON: {}", err))
    }
}

impl From<postcard::Error> for Error {
    fn from(err: postcard::Error) -> Self {
        Error::exception(format!("Invalid snapshot: {}", err))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::exception(format!("I/O failure: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_add_source_dedups_by_hash() {
        let mut err = Error::new(ErrorKind::InvalidOperation, "boom");
        let seg = SourceSegment::new("a + b", 0..5);
        err.add_source(seg.clone());
        err.add_source(seg);
        err.add_source(SourceSegment::new("c", 0..1));
        assert_eq!(err.sources().len(), 2);
        assert_eq!(err.sources()[0].fragment(), "a + b");
    }

    #[test]
    fn test_display() {
        let err = Error::readonly("x");
        assert_eq!(
            err.to_string(),
            "Readonly violation: Cannot change the value of readonly variable 'x'"
        );
    }

    #[test]
    fn test_kind_names_round_trip() {
        for kind in [ErrorKind::Timeout, ErrorKind::PurityViolation] {
            assert_eq!(ErrorKind::from_name(kind.name()), Some(kind));
        }
        assert!(!ErrorKind::Assertion.is_recoverable());
    }
}
