//! Error types for cash aggregation

use thiserror::Error;

/// Result type for aggregation operations
pub type Result<T> = std::result::Result<T, Error>;

/// Aggregation errors
#[derive(Error, Debug)]
pub enum Error {
    /// Custody ledger error
    #[error("Custody error: {0}")]
    Custody(#[from] custody_core::Error),

    /// Declared breakdown does not reconcile with the expected amount
    #[error("Denomination mismatch: claimed {calculated}, expected {expected}")]
    DenominationMismatch {
        /// Σ denomination × count of the claimed breakdown
        calculated: rust_decimal::Decimal,
        /// Amount the breakdown had to sum to
        expected: rust_decimal::Decimal,
    },

    /// Aggregation spans more than one owning actor
    #[error("Multi-actor violation: {0}")]
    MultiActorViolation(String),

    /// Missing or malformed input
    #[error("Validation error: {0}")]
    Validation(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<String> for Error {
    fn from(msg: String) -> Self {
        Error::Other(msg)
    }
}

impl From<&str> for Error {
    fn from(msg: &str) -> Self {
        Error::Other(msg.to_string())
    }
}
