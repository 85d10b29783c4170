//! Errors raised while parsing, building, or analyzing MuASM programs.
//!
//! Every fallible function in this crate returns `Result<T, Error>`. The
//! analysis entry points never hand an `Error` back to the caller directly;
//! they fold it into the `AnalysisResult`, using `Error::error_type` and
//! `Error::detail` to produce the structured wire form.

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use thiserror::Error;

/// A diagnostic produced while turning source text into a `Program`.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParseError {
    message: String,
    source_line: Option<usize>,
    at: Option<usize>,
}

impl ParseError {
    pub fn new<S: Into<String>>(message: S) -> ParseError {
        ParseError {
            message: message.into(),
            source_line: None,
            at: None,
        }
    }

    /// Attach the 1-based source line this error refers to.
    pub fn with_line(mut self, source_line: usize) -> ParseError {
        self.source_line = Some(source_line);
        self
    }

    /// Attach the 0-based column of the offending token.
    pub fn with_column(mut self, at: usize) -> ParseError {
        self.at = Some(at);
        self
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn source_line(&self) -> Option<usize> {
        self.source_line
    }

    pub fn at(&self) -> Option<usize> {
        self.at
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.source_line {
            Some(line) => write!(f, "line {}: {}", line, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

/// The three error classes reported in an `AnalysisResult`.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum ErrorType {
    ParseError,
    AnalysisError,
    InternalError,
}

impl fmt::Display for ErrorType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ErrorType::ParseError => write!(f, "ParseError"),
            ErrorType::AnalysisError => write!(f, "AnalysisError"),
            ErrorType::InternalError => write!(f, "InternalError"),
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Parse(ParseError),
    #[error("Malformed graph: {0}")]
    Graph(String),
    #[error("jmp at pc {pc} has an unresolvable target `{target}`")]
    UnresolvedJump { pc: usize, target: String },
    #[error("windowSize must be positive, got {0}")]
    InvalidWindowSize(i64),
    #[error("specWindow must be positive, got {0}")]
    InvalidSpecWindow(i64),
    #[error("Exceeded iterationCap of {0} state relaxations")]
    IterationCapExceeded(usize),
    #[error("Exceeded maxSteps of {0} trace steps")]
    MaxStepsExceeded(usize),
    #[error("Unsupported instruction at node {node}: {detail}")]
    UnsupportedInstruction { node: String, detail: String },
    #[error("Unknown option value `{0}`")]
    UnknownOption(String),
    #[error("The vertex id {0} does not exist in the graph")]
    VertexNotFound(usize),
    #[error("Json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Custom(String),
}

impl Error {
    /// Classify this error for the result wire format.
    pub fn error_type(&self) -> ErrorType {
        match self {
            Error::Parse(_) | Error::Graph(_) | Error::UnresolvedJump { .. } | Error::Json(_) => {
                ErrorType::ParseError
            }
            Error::InvalidWindowSize(_)
            | Error::InvalidSpecWindow(_)
            | Error::IterationCapExceeded(_)
            | Error::MaxStepsExceeded(_)
            | Error::UnsupportedInstruction { .. }
            | Error::UnknownOption(_) => ErrorType::AnalysisError,
            Error::VertexNotFound(_) | Error::Io(_) | Error::Custom(_) => ErrorType::InternalError,
        }
    }

    /// Structured detail for this error, if any.
    pub fn detail(&self) -> Option<serde_json::Value> {
        match self {
            Error::Parse(parse_error) => Some(json!({
                "sourceLine": parse_error.source_line(),
                "at": parse_error.at(),
            })),
            Error::UnresolvedJump { pc, target } => Some(json!({
                "pc": pc,
                "target": target,
            })),
            Error::InvalidWindowSize(window_size) => Some(json!({ "windowSize": window_size })),
            Error::InvalidSpecWindow(spec_window) => Some(json!({ "specWindow": spec_window })),
            Error::IterationCapExceeded(iteration_cap) => {
                Some(json!({ "iterationCap": iteration_cap }))
            }
            Error::MaxStepsExceeded(max_steps) => Some(json!({ "maxSteps": max_steps })),
            Error::UnsupportedInstruction { node, .. } => Some(json!({ "nodeId": node })),
            Error::Graph(_)
            | Error::UnknownOption(_)
            | Error::VertexNotFound(_)
            | Error::Json(_)
            | Error::Io(_)
            | Error::Custom(_) => None,
        }
    }
}

impl From<ParseError> for Error {
    fn from(parse_error: ParseError) -> Error {
        Error::Parse(parse_error)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Error {
        Error::Custom(s.to_string())
    }
}

impl From<String> for Error {
    fn from(s: String) -> Error {
        Error::Custom(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_errors_mention_the_option() {
        let error = Error::InvalidWindowSize(0);
        assert!(error.to_string().contains("windowSize"));
        assert_eq!(error.error_type(), ErrorType::AnalysisError);
        assert_eq!(error.detail().unwrap()["windowSize"], 0);
    }

    #[test]
    fn parse_error_detail_carries_line() {
        let error: Error = ParseError::new("Duplicate label `L`").with_line(3).into();
        assert_eq!(error.error_type(), ErrorType::ParseError);
        assert_eq!(error.to_string(), "line 3: Duplicate label `L`");
        assert_eq!(error.detail().unwrap()["sourceLine"], 3);
    }

    #[test]
    fn free_form_errors_are_internal() {
        let error: Error = "something odd".into();
        assert_eq!(error.error_type(), ErrorType::InternalError);
        assert!(error.detail().is_none());
    }
}
