//! Error types for amount reconciliation

use thiserror::Error;

/// Result type for reconciler operations
pub type Result<T> = std::result::Result<T, Error>;

/// Reconciler errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Denomination key is zero or negative
    #[error("Invalid denomination: {0}")]
    InvalidDenomination(String),

    /// Breakdown construction received invalid input
    #[error("Invalid breakdown: {0}")]
    InvalidBreakdown(String),
}
