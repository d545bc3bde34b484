//! Breakdown-vs-expected reconciliation
//!
//! `matches` holds if and only if |calculated − expected| < tolerance.
//! The comparison is strict so a difference of exactly one tolerance unit
//! counts as a mismatch.

use crate::breakdown::DenominationBreakdown;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Default absolute tolerance (0.01)
pub fn default_tolerance() -> Decimal {
    Decimal::new(1, 2)
}

/// Outcome of reconciling a breakdown against an expected amount
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AmountReconciliation {
    /// Σ denomination × count
    pub calculated: Decimal,

    /// Amount the breakdown was claimed to sum to
    pub expected: Decimal,

    /// calculated − expected (signed)
    pub difference: Decimal,

    /// Whether |difference| is within tolerance
    pub matches: bool,
}

/// Reconcile a denomination breakdown against an expected amount
pub fn reconcile(
    breakdown: &DenominationBreakdown,
    expected: Decimal,
    tolerance: Decimal,
) -> AmountReconciliation {
    let calculated = breakdown.total();
    let difference = calculated - expected;

    AmountReconciliation {
        calculated,
        expected,
        difference,
        matches: difference.abs() < tolerance,
    }
}

/// Shared amount comparison used by every aggregation step
pub fn within_tolerance(expected: Decimal, actual: Decimal, tolerance: Decimal) -> bool {
    (expected - actual).abs() < tolerance
}
