//! Compilation errors
//!
//! Every failure of parsing or lowering is reportable as a location plus a
//! human-readable message. Errors abort the compilation of the flow they
//! occur in; the project assembler collects them per flow.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::parser::atoms::Location;

#[derive(Debug, Clone, Error)]
pub enum CompileError {
    /// The text is not well-formed YAML
    #[error("invalid YAML at {location}: {message}")]
    Yaml { location: Location, message: String },

    /// No grammar alternative matched at `location`
    #[error("expected {}, got {found} at {location}", join_expected(.expected))]
    Syntax {
        location: Location,
        expected: Vec<String>,
        found: String,
    },

    /// Two options that cannot be combined on one step (`error` + `retry`)
    #[error("options '{first}' and '{second}' cannot be used together at {location}")]
    ConflictingOptions {
        location: Location,
        first: &'static str,
        second: &'static str,
    },

    /// `withItems` is neither an expression nor an array
    #[error("invalid withItems at {location}: {message}")]
    InvalidWithItems { location: Location, message: String },

    /// `retry.times` is not a non-negative integer or an expression
    #[error("invalid retry at {location}: {message}")]
    InvalidRetry { location: Location, message: String },

    /// `retry.delay` cannot be interpreted as a duration
    #[error("invalid retry delay at {location}: {value}")]
    InvalidDelay { location: Location, value: String },

    /// A step placed after a branch that never continues (`return`, `exit`)
    #[error("unreachable step at {location}: the previous step never completes")]
    UnreachableStep { location: Location },

    /// The produced graph violates a structural invariant
    #[error("flow '{flow}' produced an invalid graph: {}", .violations.join("; "))]
    Structural { flow: String, violations: Vec<String> },
}

fn join_expected(expected: &[String]) -> String {
    match expected.len() {
        0 => "something else".to_string(),
        1 => expected[0].clone(),
        n => format!("{} or {}", expected[..n - 1].join(", "), expected[n - 1]),
    }
}

impl CompileError {
    pub fn location(&self) -> Option<&Location> {
        match self {
            CompileError::Yaml { location, .. }
            | CompileError::Syntax { location, .. }
            | CompileError::ConflictingOptions { location, .. }
            | CompileError::InvalidWithItems { location, .. }
            | CompileError::InvalidRetry { location, .. }
            | CompileError::InvalidDelay { location, .. }
            | CompileError::UnreachableStep { location } => Some(location),
            CompileError::Structural { .. } => None,
        }
    }

    pub fn diagnostic(&self) -> Diagnostic {
        let location = self.location();
        Diagnostic {
            source: location.map(|l| l.source.to_string()),
            line: location.map(|l| l.line),
            column: location.map(|l| l.column),
            message: self.to_string(),
        }
    }
}

/// Flat, serializable view of an error for tooling output
#[derive(Debug, Clone, Serialize)]
pub struct Diagnostic {
    pub source: Option<String>,
    pub line: Option<usize>,
    pub column: Option<usize>,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.source, self.line, self.column) {
            (Some(source), Some(line), Some(col)) => {
                write!(f, "{}:{}:{}: error: {}", source, line, col, self.message)
            }
            _ => write!(f, "error: {}", self.message),
        }
    }
}

pub type CompileResult<T> = Result<T, CompileError>;
