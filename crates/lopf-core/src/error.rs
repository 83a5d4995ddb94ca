//! Unified error types for the LOPF workspace
//!
//! This module provides a common error type [`LopfError`] that can represent
//! errors from any stage of a network optimisation: data access, model
//! construction and the solver hand-off. Domain-specific failures are mapped
//! onto it at API boundaries.
//!
//! # Example
//!
//! ```ignore
//! use lopf_core::{LopfError, LopfResult};
//!
//! fn run(network: &mut Network) -> LopfResult<()> {
//!     network.validate()?;
//!     optimize(network, None, &OptimizeConfig::default())?;
//!     Ok(())
//! }
//! ```

use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Termination status reported by a solver backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationStatus {
    Optimal,
    Infeasible,
    Unbounded,
    /// Backend-specific failure (numerical trouble, unsupported feature, ...)
    Error(String),
}

impl TerminationStatus {
    pub fn is_optimal(&self) -> bool {
        matches!(self, TerminationStatus::Optimal)
    }
}

impl fmt::Display for TerminationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminationStatus::Optimal => write!(f, "optimal"),
            TerminationStatus::Infeasible => write!(f, "infeasible"),
            TerminationStatus::Unbounded => write!(f, "unbounded"),
            TerminationStatus::Error(msg) => write!(f, "error ({msg})"),
        }
    }
}

/// Unified error type for all LOPF operations.
#[derive(Error, Debug)]
pub enum LopfError {
    /// I/O errors (configuration files)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Parsing/deserialization errors
    #[error("Parse error: {0}")]
    Parse(String),

    /// Network data validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Missing or malformed component data (attributes, instances, series)
    #[error("Data error: {0}")]
    Data(String),

    /// Inconsistent optimisation settings
    #[error("Configuration error: {0}")]
    Config(String),

    /// Model construction errors (duplicate groups, illegal state transitions)
    #[error("Model error: {0}")]
    Model(String),

    /// Solver backend errors that happen before a status is known
    #[error("Solver error: {0}")]
    Solver(String),

    /// The solver finished without an optimal solution
    #[error("Solve failed with status {status}: {message}")]
    SolveFailed {
        status: TerminationStatus,
        message: String,
    },

    /// Generic errors (for wrapping external errors)
    #[error("{0}")]
    Other(String),
}

impl LopfError {
    /// Solver status carried by a failed solve, if any.
    pub fn termination_status(&self) -> Option<&TerminationStatus> {
        match self {
            LopfError::SolveFailed { status, .. } => Some(status),
            _ => None,
        }
    }
}

/// Convenience type alias for Results using LopfError.
pub type LopfResult<T> = Result<T, LopfError>;

impl From<String> for LopfError {
    fn from(s: String) -> Self {
        LopfError::Other(s)
    }
}

impl From<&str> for LopfError {
    fn from(s: &str) -> Self {
        LopfError::Other(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = LopfError::Data("attribute 'foo' missing for Generator".into());
        assert!(err.to_string().contains("Data error"));
        assert!(err.to_string().contains("foo"));
    }

    #[test]
    fn test_solve_failed_carries_status() {
        let err = LopfError::SolveFailed {
            status: TerminationStatus::Infeasible,
            message: "load exceeds capacity".into(),
        };
        assert_eq!(err.termination_status(), Some(&TerminationStatus::Infeasible));
        assert!(err.to_string().contains("infeasible"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: LopfError = io_err.into();
        assert!(matches!(err, LopfError::Io(_)));
    }

    #[test]
    fn test_message_conversion() {
        let err: LopfError = format!("window {} failed", 2).into();
        assert!(matches!(err, LopfError::Other(ref m) if m == "window 2 failed"));
        let err: LopfError = "no snapshots".into();
        assert!(matches!(err, LopfError::Other(_)));
        assert_eq!(err.termination_status(), None);
    }

    #[test]
    fn test_question_mark_operator() {
        fn inner() -> LopfResult<()> {
            Err(LopfError::Config("multi-invest without periods".into()))
        }

        fn outer() -> LopfResult<()> {
            inner()?;
            Ok(())
        }

        assert!(matches!(outer(), Err(LopfError::Config(_))));
    }
}
