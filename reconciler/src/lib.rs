//! Amount reconciliation for CashTrail
//!
//! Pure functions validating that a claimed denomination breakdown sums to
//! an expected amount within tolerance. Every aggregation step (bundle
//! creation, bundle acceptance, superbundle creation, deposit comparison)
//! goes through this single implementation so the tolerance and rounding
//! rule cannot drift between call sites.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod breakdown;
pub mod error;
pub mod reconcile;

pub use breakdown::DenominationBreakdown;
pub use error::{Error, Result};
pub use reconcile::{default_tolerance, reconcile, within_tolerance, AmountReconciliation};
