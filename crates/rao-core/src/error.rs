//! Unified error type for the remedial action optimisation crates
//!
//! Every fallible operation of the data model and of the problem fillers
//! returns [`RaoResult`]. The variants follow the failure taxonomy of the
//! linear optimisation:
//!
//! - **Contract violations** ([`RaoError::UndefinedHandle`],
//!   [`RaoError::DuplicateHandle`]) signal an invariant break between fillers
//!   and abort the perimeter's optimisation.
//! - **Unsupported variants** ([`RaoError::UnsupportedRangeAction`]) are
//!   raised when a range action reaches logic written for another variant.
//! - **Input errors** ([`RaoError::MissingInput`], [`RaoError::Validation`],
//!   [`RaoError::Config`]) come from the collaborators feeding the core.
//!
//! # Example
//!
//! ```ignore
//! use rao_core::{RaoError, RaoResult};
//!
//! fn reference_flow(flows: &FlowResults, cnec: &CnecId) -> RaoResult<f64> {
//!     flows.flow(cnec, Side::One)
//! }
//! ```

use thiserror::Error;

/// Unified error type for all optimisation operations.
#[derive(Error, Debug)]
pub enum RaoError {
    /// A variable or constraint was looked up before its creator filled it
    #[error("{0} has not been created yet")]
    UndefinedHandle(String),

    /// A variable or constraint was created twice
    #[error("{0} already exists")]
    DuplicateHandle(String),

    /// A range action variant reached logic that does not handle it
    #[error("Unsupported range action: {0}")]
    UnsupportedRangeAction(String),

    /// An input result does not hold the requested value
    #[error("Missing input: {0}")]
    MissingInput(String),

    /// Data model validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Solver backend errors
    #[error("Solver error: {0}")]
    Solver(String),

    /// Solution values requested before a successful solve
    #[error("Linear problem has not been solved: {0}")]
    NotSolved(String),

    /// Sensitivity computation errors
    #[error("Sensitivity computation failed: {0}")]
    Sensitivity(String),

    /// Generic errors (for wrapping external errors)
    #[error("{0}")]
    Other(String),
}

/// Convenience type alias for Results using RaoError.
pub type RaoResult<T> = Result<T, RaoError>;

impl RaoError {
    /// Whether this error breaks the contract between fillers.
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            RaoError::UndefinedHandle(_) | RaoError::DuplicateHandle(_)
        )
    }
}

// Conversion from anyhow::Error
impl From<anyhow::Error> for RaoError {
    fn from(err: anyhow::Error) -> Self {
        RaoError::Other(err.to_string())
    }
}

// Conversion from string-like types for convenience
impl From<String> for RaoError {
    fn from(s: String) -> Self {
        RaoError::Other(s)
    }
}

impl From<&str> for RaoError {
    fn from(s: &str) -> Self {
        RaoError::Other(s.to_string())
    }
}
