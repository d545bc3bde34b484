//! Typed order queries
//!
//! Callers filter the order set with a closed predicate enum instead of
//! ad-hoc string expressions, so every query the system can run is visible
//! in the type and testable on its own.

use crate::types::{ActorId, CodType, MoneyState, Order, PaymentType};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// Predicate over orders
#[derive(Debug, Clone)]
pub enum OrderPredicate {
    /// Every order
    All,

    /// money_state is one of the listed states
    StateIn(Vec<MoneyState>),

    /// cod_type present and one of the listed channels
    CodTypeIn(Vec<CodType>),

    /// Assigned to this rider
    RiderIs(ActorId),

    /// Handed to this ASM
    AsmIs(ActorId),

    /// Payment type matches
    PaymentTypeIs(PaymentType),

    /// Orders carrying cash through the custody chain
    InCustodyChain,

    /// Member of this bundle
    InBundle(uuid::Uuid),

    /// Not referenced by any live bundle
    Unbundled,

    /// Covered by this deposit
    InDeposit(uuid::Uuid),

    /// Carries a non-collection marker
    MarkedNonCollected,

    /// collected_amount present and below cod_amount
    PartialCollection,

    /// custody amount at least this value
    AmountAtLeast(Decimal),

    /// Created at or after this instant
    CreatedSince(DateTime<Utc>),

    /// Both sub-predicates hold
    And(Box<OrderPredicate>, Box<OrderPredicate>),

    /// Either sub-predicate holds
    Or(Box<OrderPredicate>, Box<OrderPredicate>),

    /// Sub-predicate does not hold
    Not(Box<OrderPredicate>),
}

impl OrderPredicate {
    /// Evaluate the predicate against an order
    pub fn matches(&self, order: &Order) -> bool {
        match self {
            OrderPredicate::All => true,
            OrderPredicate::StateIn(states) => states.contains(&order.money_state),
            OrderPredicate::CodTypeIn(types) => {
                order.cod_type.map(|t| types.contains(&t)).unwrap_or(false)
            }
            OrderPredicate::RiderIs(rider) => order.rider.as_ref() == Some(rider),
            OrderPredicate::AsmIs(asm) => order.asm.as_ref() == Some(asm),
            OrderPredicate::PaymentTypeIs(pt) => order.payment_type == *pt,
            OrderPredicate::InCustodyChain => order.in_custody_chain(),
            OrderPredicate::InBundle(bundle_id) => order.bundle_id == Some(*bundle_id),
            OrderPredicate::Unbundled => order.bundle_id.is_none(),
            OrderPredicate::InDeposit(deposit_id) => order.deposit_id == Some(*deposit_id),
            OrderPredicate::MarkedNonCollected => order.non_collection.is_some(),
            OrderPredicate::PartialCollection => order.is_partial_collection(),
            OrderPredicate::AmountAtLeast(min) => order.custody_amount() >= *min,
            OrderPredicate::CreatedSince(since) => order.created_at >= *since,
            OrderPredicate::And(a, b) => a.matches(order) && b.matches(order),
            OrderPredicate::Or(a, b) => a.matches(order) || b.matches(order),
            OrderPredicate::Not(inner) => !inner.matches(order),
        }
    }

    /// Conjunction helper
    pub fn and(self, other: OrderPredicate) -> OrderPredicate {
        OrderPredicate::And(Box::new(self), Box::new(other))
    }

    /// Disjunction helper
    pub fn or(self, other: OrderPredicate) -> OrderPredicate {
        OrderPredicate::Or(Box::new(self), Box::new(other))
    }

    /// Negation helper
    pub fn not(self) -> OrderPredicate {
        OrderPredicate::Not(Box::new(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CodType;
    use uuid::Uuid;

    fn sample() -> Order {
        let mut order = Order::new(
            Uuid::new_v4(),
            PaymentType::Cod,
            Some(CodType::HardCash),
            Decimal::from(800),
        );
        order.money_state = MoneyState::CollectedByRider;
        order.rider = Some(ActorId::new("rider-7"));
        order.collected_amount = Some(Decimal::from(650));
        order
    }

    #[test]
    fn test_simple_predicates() {
        let order = sample();

        assert!(OrderPredicate::All.matches(&order));
        assert!(OrderPredicate::StateIn(vec![MoneyState::CollectedByRider]).matches(&order));
        assert!(!OrderPredicate::StateIn(vec![MoneyState::Deposited]).matches(&order));
        assert!(OrderPredicate::RiderIs(ActorId::new("rider-7")).matches(&order));
        assert!(!OrderPredicate::RiderIs(ActorId::new("rider-8")).matches(&order));
        assert!(OrderPredicate::Unbundled.matches(&order));
        assert!(OrderPredicate::PartialCollection.matches(&order));
        assert!(OrderPredicate::AmountAtLeast(Decimal::from(650)).matches(&order));
        assert!(!OrderPredicate::AmountAtLeast(Decimal::from(651)).matches(&order));
    }

    #[test]
    fn test_combinators() {
        let order = sample();

        let held_by_rider = OrderPredicate::StateIn(vec![MoneyState::CollectedByRider])
            .and(OrderPredicate::RiderIs(ActorId::new("rider-7")));
        assert!(held_by_rider.matches(&order));

        let wrong_rider = OrderPredicate::RiderIs(ActorId::new("rider-8"))
            .or(OrderPredicate::PartialCollection);
        assert!(wrong_rider.matches(&order));

        assert!(!OrderPredicate::Unbundled.not().matches(&order));
    }
}
