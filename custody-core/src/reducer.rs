//! Pure money-state reducer
//!
//! `apply(order, event)` derives the next order state from a custody event
//! without touching storage, so the projection is independently testable
//! and replayable. Replaying an already-applied event is a no-op, never an
//! error, to tolerate at-least-once delivery.

use crate::error::{Error, Result};
use crate::types::{
    ActorId, CustodyAction, CustodyEvent, MoneyState, NonCollection, Order,
};
use rust_decimal::Decimal;

/// Outcome of applying an event
#[derive(Debug, Clone)]
pub enum Applied {
    /// Event advanced the order; the new projection
    Changed(Order),
    /// Duplicate delivery; nothing to do
    NoOp,
}

/// Apply a custody event to an order, returning the next projection
pub fn apply(order: &Order, event: &CustodyEvent) -> Result<Applied> {
    if event.order_id != order.order_id {
        return Err(Error::Validation(format!(
            "event {} targets order {}, not {}",
            event.event_id, event.order_id, order.order_id
        )));
    }

    // Exact replay of a recorded event is always a no-op.
    if order.event_ids.contains(&event.event_id) {
        return Ok(Applied::NoOp);
    }

    match &event.action {
        CustodyAction::RiderCollection {
            rider,
            collected_amount,
        } => apply_rider_collection(order, event, rider, *collected_amount),
        CustodyAction::AsmHandover {
            asm,
            collected_amount,
            proof_ref,
        } => apply_asm_handover(order, event, asm, *collected_amount, proof_ref.as_deref()),
        CustodyAction::NonCollection {
            asm,
            reason,
            future_possible,
            expected_date,
        } => apply_non_collection(order, event, asm, reason, *future_possible, *expected_date),
        CustodyAction::Deposit { deposit_id } => apply_deposit(order, event, *deposit_id),
        CustodyAction::Reconciliation { matched } => apply_reconciliation(order, event, *matched),
        CustodyAction::MarkedTerminal { kind } => {
            let target = kind.money_state();
            if order.money_state == target {
                return Ok(Applied::NoOp);
            }
            if !order.money_state.is_pre_deposit() {
                return Err(invalid(order, event));
            }

            let mut next = order.clone();
            next.money_state = target;
            Ok(record(next, event))
        }
    }
}

fn apply_rider_collection(
    order: &Order,
    event: &CustodyEvent,
    rider: &ActorId,
    collected_amount: Option<Decimal>,
) -> Result<Applied> {
    require_custody_chain(order)?;
    check_amount_bounds(order, collected_amount)?;

    // Absent amount means collected in full.
    let collected = collected_amount.unwrap_or(order.cod_amount);

    match order.money_state {
        MoneyState::Uncollected => {
            // Rider identity must match; an unassigned order auto-assigns.
            if let Some(assigned) = &order.rider {
                if assigned != rider {
                    return Err(Error::ActorMismatch {
                        order_id: order.order_id,
                        expected: assigned.to_string(),
                        got: rider.to_string(),
                    });
                }
            }

            let mut next = order.clone();
            next.rider = Some(rider.clone());
            next.collected_amount = Some(collected);
            next.money_state = MoneyState::CollectedByRider;
            next.collected_at = Some(event.recorded_at);
            Ok(record(next, event))
        }
        MoneyState::CollectedByRider
            if order.rider.as_ref() == Some(rider)
                && order.collected_amount == Some(collected) =>
        {
            Ok(Applied::NoOp)
        }
        _ => Err(invalid(order, event)),
    }
}

fn apply_asm_handover(
    order: &Order,
    event: &CustodyEvent,
    asm: &ActorId,
    collected_amount: Option<Decimal>,
    proof_ref: Option<&str>,
) -> Result<Applied> {
    require_custody_chain(order)?;
    check_amount_bounds(order, collected_amount)?;

    // QR collections must carry a payment proof; absence is a validation
    // error, not a silent skip.
    if order.cod_type == Some(crate::types::CodType::Qr)
        && proof_ref.map(str::trim).unwrap_or("").is_empty()
    {
        return Err(Error::Validation(format!(
            "QR order {} requires a payment proof reference at handover",
            order.order_id
        )));
    }

    match order.money_state {
        MoneyState::CollectedByRider => {
            if let Some(assigned) = &order.asm {
                if assigned != asm {
                    return Err(Error::ActorMismatch {
                        order_id: order.order_id,
                        expected: assigned.to_string(),
                        got: asm.to_string(),
                    });
                }
            }

            let mut next = order.clone();
            next.asm = Some(asm.clone());
            if let Some(amount) = collected_amount {
                next.collected_amount = Some(amount);
            }
            if let Some(proof) = proof_ref {
                next.payment_proof = Some(proof.to_string());
            }
            next.money_state = MoneyState::HandoverToAsm;
            next.handover_at = Some(event.recorded_at);
            Ok(record(next, event))
        }
        MoneyState::HandoverToAsm if order.asm.as_ref() == Some(asm) => Ok(Applied::NoOp),
        _ => Err(invalid(order, event)),
    }
}

fn apply_non_collection(
    order: &Order,
    event: &CustodyEvent,
    asm: &ActorId,
    reason: &str,
    future_possible: bool,
    expected_date: Option<chrono::DateTime<chrono::Utc>>,
) -> Result<Applied> {
    if reason.trim().is_empty() {
        return Err(Error::Validation(format!(
            "non-collection reason for order {} must not be empty",
            order.order_id
        )));
    }

    // The order may physically still be with the rider; any pre-deposit
    // state is acceptable, deposited/terminal states are not.
    if !order.money_state.is_pre_deposit() {
        return Err(invalid(order, event));
    }

    if let Some(assigned) = &order.asm {
        if assigned != asm {
            return Err(Error::ActorMismatch {
                order_id: order.order_id,
                expected: assigned.to_string(),
                got: asm.to_string(),
            });
        }
    }

    let marker = NonCollection {
        reason: reason.to_string(),
        future_possible,
        expected_date,
    };

    if order.non_collection.as_ref() == Some(&marker) {
        return Ok(Applied::NoOp);
    }

    let mut next = order.clone();
    next.asm = Some(asm.clone());
    next.non_collection = Some(marker);
    Ok(record(next, event))
}

fn apply_deposit(order: &Order, event: &CustodyEvent, deposit_id: uuid::Uuid) -> Result<Applied> {
    match order.money_state {
        MoneyState::HandoverToAsm => {
            let mut next = order.clone();
            next.deposit_id = Some(deposit_id);
            next.money_state = MoneyState::Deposited;
            next.deposited_at = Some(event.recorded_at);
            Ok(record(next, event))
        }
        MoneyState::Deposited if order.deposit_id == Some(deposit_id) => Ok(Applied::NoOp),
        _ => Err(invalid(order, event)),
    }
}

fn apply_reconciliation(order: &Order, event: &CustodyEvent, matched: bool) -> Result<Applied> {
    match order.money_state {
        // First evaluation, or an operator re-run after an exception.
        MoneyState::Deposited | MoneyState::ReconciliationException => {
            let target = if matched {
                MoneyState::Reconciled
            } else {
                MoneyState::ReconciliationException
            };
            if order.money_state == target {
                return Ok(Applied::NoOp);
            }

            let mut next = order.clone();
            next.money_state = target;
            if matched {
                next.reconciled_at = Some(event.recorded_at);
            }
            Ok(record(next, event))
        }
        MoneyState::Reconciled if matched => Ok(Applied::NoOp),
        _ => Err(invalid(order, event)),
    }
}

fn require_custody_chain(order: &Order) -> Result<()> {
    if !order.in_custody_chain() {
        return Err(Error::Validation(format!(
            "order {} does not participate in the cash custody chain",
            order.order_id
        )));
    }
    Ok(())
}

fn check_amount_bounds(order: &Order, collected_amount: Option<Decimal>) -> Result<()> {
    if let Some(amount) = collected_amount {
        if amount < Decimal::ZERO || amount > order.cod_amount {
            return Err(Error::Validation(format!(
                "collected amount {} for order {} outside [0, {}]",
                amount, order.order_id, order.cod_amount
            )));
        }
    }
    Ok(())
}

fn invalid(order: &Order, event: &CustodyEvent) -> Error {
    Error::InvalidStateTransition {
        order_id: order.order_id,
        state: order.money_state,
        action: event.action.kind(),
    }
}

fn record(mut next: Order, event: &CustodyEvent) -> Applied {
    next.event_ids.push(event.event_id);
    next.updated_at = event.recorded_at;
    Applied::Changed(next)
}
