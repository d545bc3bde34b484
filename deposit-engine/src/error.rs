//! Error types for deposits and reconciliation

use thiserror::Error;

/// Result type for deposit operations
pub type Result<T> = std::result::Result<T, Error>;

/// Deposit and reconciliation errors
#[derive(Error, Debug)]
pub enum Error {
    /// Custody ledger error
    #[error("Custody error: {0}")]
    Custody(#[from] custody_core::Error),

    /// Deposit draws orders from more than one ASM
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
