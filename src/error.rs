//! Error types for the selection language, with position spans for parse errors.

use std::fmt;
use thiserror::Error;

/// A parse failure with the offending span of the original query.
#[derive(Debug, Clone)]
pub struct ParseError {
    pub position: usize,
    pub end: usize,
    pub expected: String,
    pub got: String,
    pub query: String,
}

impl ParseError {
    pub fn new(
        expected: impl Into<String>,
        got: impl Into<String>,
        span: (usize, usize),
        query: impl Into<String>,
    ) -> Self {
        Self {
            position: span.0,
            end: span.1,
            expected: expected.into(),
            got: got.into(),
            query: query.into(),
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "expected {}, found {} at position {}",
            self.expected, self.got, self.position
        )?;
        if !self.query.is_empty() {
            write!(f, "\n  {}", self.query)?;
            write!(
                f,
                "\n  {}{}",
                " ".repeat(self.position),
                "^".repeat(self.end.saturating_sub(self.position).max(1))
            )?;
        }
        Ok(())
    }
}

impl std::error::Error for ParseError {}

/// Error type covering every failure mode of the selection engine.
///
/// Nothing is recovered internally; the first error aborts the evaluation
/// and is reported to the caller.
#[derive(Debug, Error)]
pub enum SelectError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("name `{0}` is already registered")]
    DuplicateName(String),

    #[error("macro `{0}` expands through itself")]
    MacroCycle(String),

    #[error("no column for keyword `{0}`")]
    UnknownField(String),

    #[error("variable `${0}` is not bound")]
    UnknownVariable(String),

    #[error("type error: {0}")]
    Type(String),

    #[error("division by zero")]
    DivByZero,

    #[error("math domain error: {0}")]
    Domain(String),

    #[error("bonded selection requires bond topology")]
    NoTopology,

    #[error("invalid pattern `{pattern}`: {source}")]
    Pattern {
        pattern: String,
        source: regex::Error,
    },

    #[error("comparison of two plain numbers is not an atom selection")]
    PureNumericMask,

    #[error("catalog error: {0}")]
    Catalog(String),

    #[error("context error: {0}")]
    Context(String),
}
