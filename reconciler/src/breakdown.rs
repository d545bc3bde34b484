//! Denomination breakdown type
//!
//! A count of physical currency notes claimed to sum to a given amount.
//! The map is sparse: a denomination with count zero is removed, never
//! stored.

use crate::error::{Error, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Sparse map of note value to note count
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DenominationBreakdown(BTreeMap<Decimal, u32>);

impl DenominationBreakdown {
    /// Create empty breakdown
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Build from (denomination, count) pairs
    ///
    /// Denominations must be positive; zero counts are dropped.
    pub fn from_counts<I>(counts: I) -> Result<Self>
    where
        I: IntoIterator<Item = (Decimal, u32)>,
    {
        let mut breakdown = Self::new();
        for (denomination, count) in counts {
            breakdown.set(denomination, count)?;
        }
        Ok(breakdown)
    }

    /// Set the count for a denomination
    ///
    /// A count of zero removes the entry (sparse map invariant).
    pub fn set(&mut self, denomination: Decimal, count: u32) -> Result<()> {
        if denomination <= Decimal::ZERO {
            return Err(Error::InvalidDenomination(format!(
                "denomination must be positive, got {}",
                denomination
            )));
        }

        if count == 0 {
            self.0.remove(&denomination);
        } else {
            self.0.insert(denomination, count);
        }

        Ok(())
    }

    /// Count for a denomination (0 if absent)
    pub fn count(&self, denomination: Decimal) -> u32 {
        self.0.get(&denomination).copied().unwrap_or(0)
    }

    /// Iterate (denomination, count) pairs in ascending denomination order
    pub fn counts(&self) -> impl Iterator<Item = (Decimal, u32)> + '_ {
        self.0.iter().map(|(d, c)| (*d, *c))
    }

    /// Sum of denomination × count over all entries
    pub fn total(&self) -> Decimal {
        self.0
            .iter()
            .map(|(denomination, count)| *denomination * Decimal::from(*count))
            .sum()
    }

    /// Sum two breakdowns per denomination
    ///
    /// Used to auto-aggregate constituent bundle breakdowns into a
    /// superbundle proposal.
    pub fn merge(&self, other: &Self) -> Self {
        let mut merged = self.0.clone();
        for (denomination, count) in &other.0 {
            *merged.entry(*denomination).or_insert(0) += count;
        }
        Self(merged)
    }

    /// Number of distinct denominations
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when no denominations are recorded
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn d(value: i64) -> Decimal {
        Decimal::from(value)
    }

    #[test]
    fn test_total() {
        let breakdown =
            DenominationBreakdown::from_counts([(d(500), 2), (d(100), 3), (d(20), 5)]).unwrap();
        assert_eq!(breakdown.total(), d(1400));
    }

    #[test]
    fn test_zero_count_dropped() {
        let mut breakdown = DenominationBreakdown::from_counts([(d(500), 1)]).unwrap();
        breakdown.set(d(500), 0).unwrap();
        assert!(breakdown.is_empty());
        assert_eq!(breakdown.count(d(500)), 0);
    }

    #[test]
    fn test_nonpositive_denomination_rejected() {
        assert!(DenominationBreakdown::from_counts([(d(0), 1)]).is_err());
        assert!(DenominationBreakdown::from_counts([(d(-100), 1)]).is_err());
    }

    #[test]
    fn test_merge_sums_counts() {
        let a = DenominationBreakdown::from_counts([(d(500), 2), (d(100), 1)]).unwrap();
        let b = DenominationBreakdown::from_counts([(d(500), 1), (d(50), 4)]).unwrap();

        let merged = a.merge(&b);
        assert_eq!(merged.count(d(500)), 3);
        assert_eq!(merged.count(d(100)), 1);
        assert_eq!(merged.count(d(50)), 4);
        assert_eq!(merged.total(), a.total() + b.total());
    }

    fn breakdown_strategy() -> impl Strategy<Value = DenominationBreakdown> {
        proptest::collection::vec((1u32..10_000u32, 1u32..100u32), 0..8).prop_map(|counts| {
            DenominationBreakdown::from_counts(
                counts.iter().map(|(d, c)| (Decimal::from(*d), *c)),
            )
            .unwrap()
        })
    }

    proptest! {
        /// merge conserves the total: total(a ∪ b) = total(a) + total(b)
        #[test]
        fn prop_merge_conserves_total(
            a in breakdown_strategy(),
            b in breakdown_strategy(),
        ) {
            let merged = a.merge(&b);
            prop_assert_eq!(merged.total(), a.total() + b.total());

            for (denomination, count) in merged.counts() {
                prop_assert_eq!(count, a.count(denomination) + b.count(denomination));
            }
        }
    }
}
