// ABOUTME: Error types for evaluation failures in the build-file interpreter

use crate::ast::Position;
use std::fmt;
use thiserror::Error;

/// The kind of an evaluation failure. Kinds mirror the error taxonomy of the
/// build language rather than Rust types; hosts match on these to decide how
/// to render a failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    #[error("parse error: {0}")]
    Parse(String),

    #[error("name '{0}' is not defined")]
    Name(String),

    #[error("{0}")]
    Type(String),

    #[error("{0}")]
    Value(String),

    #[error("assertion failed: {0}")]
    Assertion(String),

    #[error("{0}")]
    Invariant(String),

    #[error("{0}")]
    User(String),

    #[error("{0}")]
    Io(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("cancelled: {0}")]
    Cancelled(String),
}

/// An evaluation error: a kind plus the position of the AST node it is
/// attributed to. Positions are attached as the error climbs out of the
/// evaluator; the first attachment wins so the error points at the most
/// specific node that failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvalError {
    kind: ErrorKind,
    pos: Option<Position>,
}

pub type EvalResult<T> = Result<T, EvalError>;

impl EvalError {
    pub fn new(kind: ErrorKind) -> Self {
        EvalError { kind, pos: None }
    }

    /// Attach a position unless one is already recorded.
    #[must_use]
    pub fn at(mut self, pos: Position) -> Self {
        if self.pos.is_none() {
            self.pos = Some(pos);
        }
        self
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    pub fn position(&self) -> Option<Position> {
        self.pos
    }

    pub fn name_error(name: impl Into<String>) -> Self {
        Self::new(ErrorKind::Name(name.into()))
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Type(message.into()))
    }

    pub fn value_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Value(message.into()))
    }

    pub fn assertion(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Assertion(message.into()))
    }

    pub fn invariant(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Invariant(message.into()))
    }

    pub fn user(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::User(message.into()))
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Io(message.into()))
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout(message.into()))
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Cancelled(message.into()))
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Parse(message.into()))
    }

    /// Arity failure for a call to `function`; `expected` reads like "2" or
    /// "at most 3".
    pub fn arity(function: &str, expected: impl fmt::Display, actual: usize) -> Self {
        let expected = expected.to_string();
        let plural = if expected == "1" { "" } else { "s" };
        Self::type_error(format!(
            "{function} takes {expected} argument{plural} ({actual} given)"
        ))
    }
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)
    }
}

impl std::error::Error for EvalError {}

impl From<ErrorKind> for EvalError {
    fn from(kind: ErrorKind) -> Self {
        EvalError::new(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_attaches_once() {
        let err = EvalError::name_error("x").at(Position(4)).at(Position(9));
        assert_eq!(err.position(), Some(Position(4)));
    }

    #[test]
    fn test_display_shows_kind_message() {
        let err = EvalError::name_error("srcs");
        assert_eq!(format!("{}", err), "name 'srcs' is not defined");

        let err = EvalError::assertion("expected a test target");
        assert_eq!(
            format!("{}", err),
            "assertion failed: expected a test target"
        );
    }

    #[test]
    fn test_arity_message_pluralizes() {
        let err = EvalError::arity("len", 1, 3);
        assert_eq!(format!("{}", err), "len takes 1 argument (3 given)");
        let err = EvalError::arity("tag", 2, 3);
        assert_eq!(format!("{}", err), "tag takes 2 arguments (3 given)");
    }
}
