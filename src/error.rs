//! Unified error taxonomy for the interpreter.
//!
//! Mirrors the narrow-to-broad error kinds of the original engine: parse-time
//! structural failures, expression-evaluator failures, and runtime failures,
//! plus an opaque passthrough for host-owned collaborator failures.

use thiserror::Error;

/// A file failed to parse into a [`crate::parsed_file::ParsedFile`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("parse error in {file}:{line}: {message}")]
pub struct ParseError {
    pub file: String,
    pub line: usize,
    pub message: String,
}

impl ParseError {
    pub fn new(file: impl Into<String>, line: usize, message: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            line,
            message: message.into(),
        }
    }
}

/// A condition failed to evaluate (unbalanced parens, mismatched quotes, bad
/// bracket, ...). Carries the original condition text for diagnostics.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("expression error in `{condition}`: {message}")]
pub struct ExpressionError {
    pub condition: String,
    pub message: String,
}

impl ExpressionError {
    pub fn new(condition: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            condition: condition.into(),
            message: message.into(),
        }
    }
}

/// Divide by zero, arithmetic against a string cell, unknown operator target,
/// malformed global-variable call, or a user `#throw`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct RuntimeError {
    pub message: String,
}

impl RuntimeError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// `#throw msg` synthesizes a RuntimeError carrying the user's literal text.
    pub fn user_throw(message: impl Into<String>) -> Self {
        Self::new(message)
    }
}

/// Passed through unchanged from a host collaborator (file enumeration, chat
/// sink, external script executor). The concrete failure type is owned by the
/// embedding application, not enumerable ahead of time by this crate.
#[derive(Debug, Error)]
#[error(transparent)]
pub struct HostError(#[from] pub anyhow::Error);

/// The unifying error type the scheduler matches against when a script frame
/// or helper fails outside of normal control flow.
#[derive(Debug, Error)]
pub enum ScriptError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Expression(#[from] ExpressionError),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
    #[error(transparent)]
    Host(#[from] HostError),
}

impl ScriptError {
    /// The message shown to the user on an unhandled exception / bound to a
    /// `#catch` variable.
    pub fn message(&self) -> String {
        match self {
            ScriptError::Parse(e) => e.message.clone(),
            ScriptError::Expression(e) => e.message.clone(),
            ScriptError::Runtime(e) => e.message.clone(),
            ScriptError::Host(e) => e.0.to_string(),
        }
    }
}

impl From<anyhow::Error> for ScriptError {
    fn from(e: anyhow::Error) -> Self {
        ScriptError::Host(HostError(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runtime_error_message_passthrough() {
        let e = ScriptError::Runtime(RuntimeError::user_throw("boom"));
        assert_eq!(e.message(), "boom");
    }

    #[test]
    fn parse_error_display() {
        let e = ParseError::new("demo.cheat", 3, "unbalanced #if");
        assert_eq!(e.to_string(), "parse error in demo.cheat:3: unbalanced #if");
    }
}
