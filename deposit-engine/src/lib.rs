//! Bank deposits and reconciliation
//!
//! Turns an ASM's handed-over cash into a bank-facing deposit record and
//! settles it against the bank-confirmed credit. Orders whose cash never
//! arrived stay on the record for audit without touching the ledger;
//! reconciliation is all-or-nothing per deposit.

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod builder;
pub mod error;
pub mod evaluator;

// Re-exports
pub use builder::{DepositBuilder, DepositDetails, OrderCollectionData};
pub use error::{Error, Result};
pub use evaluator::ReconciliationEvaluator;
