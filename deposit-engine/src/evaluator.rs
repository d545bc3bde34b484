//! Bank reconciliation evaluator
//!
//! Compares the bank-confirmed credit against what the deposit claimed
//! and settles every covered order in one atomic commit. A mismatch parks
//! the whole deposit in exception; an operator may re-run the evaluation
//! after correcting the data.

use crate::error::{Error, Result};
use chrono::Utc;
use custody_core::{
    actor::CustodyHandle, CommitPlan, CustodyAction, CustodyEvent, Deposit, DepositStatus, Guard,
    MoneyState,
};
use reconciler::within_tolerance;
use rust_decimal::Decimal;
use uuid::Uuid;

/// Reconciliation evaluator
pub struct ReconciliationEvaluator {
    handle: CustodyHandle,
    tolerance: Decimal,
}

impl ReconciliationEvaluator {
    /// Create an evaluator over a custody ledger handle
    pub fn new(handle: CustodyHandle, tolerance: Decimal) -> Self {
        Self { handle, tolerance }
    }

    /// Evaluate a deposit against the bank-confirmed credit
    ///
    /// All-or-nothing per deposit: on a match every covered order becomes
    /// Reconciled, otherwise every covered order becomes
    /// ReconciliationException. Legal from Recorded and, for operator
    /// re-runs, from Exception.
    pub async fn reconcile(
        &self,
        deposit_id: Uuid,
        bank_confirmed_amount: Decimal,
    ) -> Result<Deposit> {
        let mut deposit = self.handle.get_deposit(deposit_id).await?;

        if deposit.status == DepositStatus::Reconciled {
            return Err(Error::Validation(format!(
                "deposit {} is already reconciled",
                deposit_id
            )));
        }

        // The SM-entered received amount wins over the computed total when
        // present; that is the figure the bank credit should match.
        let claimed = deposit
            .actual_amount_received
            .unwrap_or(deposit.expected_amount);
        let matched = within_tolerance(claimed, bank_confirmed_amount, self.tolerance);

        let mut plan = CommitPlan::new().guard(Guard::DepositStatusIn {
            deposit_id,
            expected: vec![DepositStatus::Recorded, DepositStatus::Exception],
        });

        for order_id in deposit.collected_order_ids() {
            plan = plan
                .guard(Guard::OrderStateIn {
                    order_id,
                    expected: vec![MoneyState::Deposited, MoneyState::ReconciliationException],
                })
                .event(CustodyEvent::new(
                    order_id,
                    CustodyAction::Reconciliation { matched },
                ));
        }

        let now = Utc::now();
        deposit.bank_confirmed_amount = Some(bank_confirmed_amount);
        deposit.status = if matched {
            DepositStatus::Reconciled
        } else {
            DepositStatus::Exception
        };
        deposit.reconciled_at = matched.then_some(now);
        plan = plan.deposit(deposit.clone());

        self.handle.commit(plan).await?;

        if matched {
            tracing::info!(
                deposit_id = %deposit_id,
                confirmed = %bank_confirmed_amount,
                "Deposit reconciled"
            );
        } else {
            tracing::warn!(
                deposit_id = %deposit_id,
                claimed = %claimed,
                confirmed = %bank_confirmed_amount,
                "Deposit parked in reconciliation exception"
            );
        }
        Ok(deposit)
    }
}
