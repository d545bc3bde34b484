//! Deposit builder
//!
//! Builds an SM's bank-facing deposit record over one ASM's orders. The
//! whole selection is validated before any side effect; orders whose cash
//! never arrived are kept on the record for audit but excluded from every
//! total, and an actual-vs-expected mismatch is recorded as variance
//! rather than rejected.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use custody_core::{
    actor::CustodyHandle, ActorId, CollectionStatus, CommitPlan, CustodyAction, CustodyEvent,
    Deposit, DepositOrderRecord, DepositStatus, Guard, MoneyState, Order,
};
use rust_decimal::Decimal;
use uuid::Uuid;

/// Per-order input to deposit creation
#[derive(Debug, Clone)]
pub struct OrderCollectionData {
    /// Order to include
    pub order_id: Uuid,

    /// Explicit collection status; None derives it from the order's
    /// non-collection marker
    pub status: Option<CollectionStatus>,

    /// Non-collection reason override
    pub reason: Option<String>,
}

impl OrderCollectionData {
    /// Collected order line
    pub fn collected(order_id: Uuid) -> Self {
        Self {
            order_id,
            status: Some(CollectionStatus::Collected),
            reason: None,
        }
    }

    /// Not-collected order line with a reason
    pub fn not_collected(order_id: Uuid, reason: impl Into<String>) -> Self {
        Self {
            order_id,
            status: Some(CollectionStatus::NotCollected),
            reason: Some(reason.into()),
        }
    }

    /// Let the order's recorded state decide
    pub fn auto(order_id: Uuid) -> Self {
        Self {
            order_id,
            status: None,
            reason: None,
        }
    }
}

/// Bank deposit parameters beyond the order selection
#[derive(Debug, Clone, Default)]
pub struct DepositDetails {
    /// SM-entered amount actually received
    pub actual_amount_received: Option<Decimal>,

    /// Deposit slip reference
    pub deposit_slip_ref: Option<String>,

    /// Bank account deposited to
    pub bank_account: Option<String>,

    /// Bank reference number
    pub reference_number: Option<String>,
}

/// Deposit builder
pub struct DepositBuilder {
    handle: CustodyHandle,
}

impl DepositBuilder {
    /// Create a builder over a custody ledger handle
    pub fn new(handle: CustodyHandle) -> Self {
        Self { handle }
    }

    /// Record a bank deposit over one ASM's orders
    ///
    /// Every Collected order moves to Deposited in the same commit;
    /// NotCollected orders stay exactly as they were.
    pub async fn create_deposit(
        &self,
        asm: ActorId,
        lines: Vec<OrderCollectionData>,
        deposit_date: DateTime<Utc>,
        details: DepositDetails,
    ) -> Result<Deposit> {
        if lines.is_empty() {
            return Err(Error::Validation(
                "deposit must cover at least one order".to_string(),
            ));
        }
        let mut seen = lines.iter().map(|l| l.order_id).collect::<Vec<_>>();
        seen.sort();
        seen.dedup();
        if seen.len() != lines.len() {
            return Err(Error::Validation(
                "deposit selection contains duplicate order ids".to_string(),
            ));
        }

        let deposit_id = Uuid::new_v4();
        let mut records = Vec::with_capacity(lines.len());
        let mut total_amount = Decimal::ZERO;
        let mut plan = CommitPlan::new();

        for line in &lines {
            let order = self.handle.get_order(line.order_id).await?;
            self.check_ownership(&order, &asm)?;

            let status = self.resolve_status(&order, line);
            match status {
                CollectionStatus::Collected => {
                    if order.money_state != MoneyState::HandoverToAsm {
                        return Err(Error::Validation(format!(
                            "order {} is {} and cannot be deposited",
                            order.order_id, order.money_state
                        )));
                    }

                    total_amount += order.custody_amount();
                    records.push(DepositOrderRecord {
                        order_id: order.order_id,
                        status: CollectionStatus::Collected,
                        reason: None,
                        amount: order.custody_amount(),
                    });

                    plan = plan
                        .guard(Guard::OrderStateIn {
                            order_id: order.order_id,
                            expected: vec![MoneyState::HandoverToAsm],
                        })
                        .event(CustodyEvent::new(
                            order.order_id,
                            CustodyAction::Deposit { deposit_id },
                        ));
                }
                CollectionStatus::NotCollected => {
                    let reason = line
                        .reason
                        .clone()
                        .or_else(|| order.non_collection.as_ref().map(|nc| nc.reason.clone()))
                        .ok_or_else(|| {
                            Error::Validation(format!(
                                "order {} marked not collected without a reason",
                                order.order_id
                            ))
                        })?;

                    // Audited on the record, untouched in the ledger
                    records.push(DepositOrderRecord {
                        order_id: order.order_id,
                        status: CollectionStatus::NotCollected,
                        reason: Some(reason),
                        amount: order.custody_amount(),
                    });
                }
            }
        }

        if records
            .iter()
            .all(|r| r.status == CollectionStatus::NotCollected)
        {
            return Err(Error::Validation(
                "deposit contains no collected orders".to_string(),
            ));
        }

        let variance = details.actual_amount_received.map(|actual| actual - total_amount);
        if let Some(v) = variance {
            if !v.is_zero() {
                tracing::warn!(
                    deposit_id = %deposit_id,
                    expected = %total_amount,
                    variance = %v,
                    "Deposit recorded with amount variance"
                );
            }
        }

        let deposit = Deposit {
            deposit_id,
            asm,
            records,
            total_amount,
            expected_amount: total_amount,
            actual_amount_received: details.actual_amount_received,
            variance,
            deposit_slip_ref: details.deposit_slip_ref,
            bank_account: details.bank_account,
            reference_number: details.reference_number,
            deposit_date,
            bank_confirmed_amount: None,
            status: DepositStatus::Recorded,
            created_at: Utc::now(),
            reconciled_at: None,
        };
        plan = plan.deposit(deposit.clone());

        self.handle.commit(plan).await?;

        tracing::info!(
            deposit_id = %deposit.deposit_id,
            asm = %deposit.asm,
            orders = deposit.records.len(),
            total = %deposit.total_amount,
            "Deposit recorded"
        );
        Ok(deposit)
    }

    fn check_ownership(&self, order: &Order, asm: &ActorId) -> Result<()> {
        match &order.asm {
            Some(owner) if owner == asm => Ok(()),
            Some(owner) => Err(Error::MultiActorViolation(format!(
                "order {} is held by ASM {}, deposit is for {}",
                order.order_id, owner, asm
            ))),
            None => Err(Error::Validation(format!(
                "order {} was never handed to an ASM",
                order.order_id
            ))),
        }
    }

    fn resolve_status(&self, order: &Order, line: &OrderCollectionData) -> CollectionStatus {
        match line.status {
            Some(explicit) => explicit,
            None if order.non_collection.is_some() => CollectionStatus::NotCollected,
            None => CollectionStatus::Collected,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use custody_core::{CodType, Config, CustodyLedger, PaymentType};

    async fn test_ledger() -> (CustodyLedger, tempfile::TempDir) {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();
        (CustodyLedger::open(config).await.unwrap(), temp_dir)
    }

    async fn handed_over_order(
        ledger: &CustodyLedger,
        asm: &str,
        amount: i64,
        collected: Option<i64>,
    ) -> Uuid {
        let order_id = Uuid::new_v4();
        ledger
            .seed_order(
                order_id,
                PaymentType::Cod,
                Some(CodType::HardCash),
                Decimal::from(amount),
            )
            .await
            .unwrap();
        ledger
            .record_rider_collection(order_id, ActorId::new("rider-1"), collected.map(Decimal::from))
            .await
            .unwrap();
        ledger
            .record_asm_handover(order_id, ActorId::new(asm), None, None)
            .await
            .unwrap();
        order_id
    }

    #[tokio::test]
    async fn test_deposit_moves_collected_orders() {
        let (ledger, _temp) = test_ledger().await;
        let builder = DepositBuilder::new(ledger.handle());

        let a = handed_over_order(&ledger, "asm-1", 500, None).await;
        let b = handed_over_order(&ledger, "asm-1", 300, Some(250)).await;

        let deposit = builder
            .create_deposit(
                ActorId::new("asm-1"),
                vec![
                    OrderCollectionData::collected(a),
                    OrderCollectionData::collected(b),
                ],
                Utc::now(),
                DepositDetails {
                    deposit_slip_ref: Some("slip-77".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        // Partial collection contributes the collected amount only
        assert_eq!(deposit.total_amount, Decimal::from(750));
        assert_eq!(deposit.status, DepositStatus::Recorded);
        assert_eq!(deposit.variance, None);

        for order_id in [a, b] {
            let order = ledger.get_order(order_id).await.unwrap();
            assert_eq!(order.money_state, MoneyState::Deposited);
            assert_eq!(order.deposit_id, Some(deposit.deposit_id));
        }

        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_non_collected_orders_audited_but_untouched() {
        let (ledger, _temp) = test_ledger().await;
        let builder = DepositBuilder::new(ledger.handle());

        let a = handed_over_order(&ledger, "asm-1", 500, None).await;
        let b = handed_over_order(&ledger, "asm-1", 400, None).await;
        ledger
            .record_non_collection(b, ActorId::new("asm-1"), "customer away", true, None)
            .await
            .unwrap();

        let deposit = builder
            .create_deposit(
                ActorId::new("asm-1"),
                vec![
                    OrderCollectionData::collected(a),
                    OrderCollectionData::auto(b),
                ],
                Utc::now(),
                DepositDetails::default(),
            )
            .await
            .unwrap();

        // Totals cover the collected order only; the other is audit-only
        assert_eq!(deposit.total_amount, Decimal::from(500));
        assert_eq!(deposit.records.len(), 2);
        let excluded = deposit
            .records
            .iter()
            .find(|r| r.order_id == b)
            .unwrap();
        assert_eq!(excluded.status, CollectionStatus::NotCollected);
        assert_eq!(excluded.reason.as_deref(), Some("customer away"));

        assert_eq!(
            ledger.get_order(b).await.unwrap().money_state,
            MoneyState::HandoverToAsm
        );
        assert_eq!(ledger.get_order(b).await.unwrap().deposit_id, None);

        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_cross_asm_selection_rejected() {
        let (ledger, _temp) = test_ledger().await;
        let builder = DepositBuilder::new(ledger.handle());

        let a = handed_over_order(&ledger, "asm-1", 500, None).await;
        let b = handed_over_order(&ledger, "asm-2", 300, None).await;

        let err = builder
            .create_deposit(
                ActorId::new("asm-1"),
                vec![
                    OrderCollectionData::collected(a),
                    OrderCollectionData::collected(b),
                ],
                Utc::now(),
                DepositDetails::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MultiActorViolation(_)));

        // Whole-batch validation: nothing was deposited
        assert_eq!(
            ledger.get_order(a).await.unwrap().money_state,
            MoneyState::HandoverToAsm
        );

        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_variance_recorded_not_rejected() {
        let (ledger, _temp) = test_ledger().await;
        let builder = DepositBuilder::new(ledger.handle());

        let a = handed_over_order(&ledger, "asm-1", 500, None).await;

        let deposit = builder
            .create_deposit(
                ActorId::new("asm-1"),
                vec![OrderCollectionData::collected(a)],
                Utc::now(),
                DepositDetails {
                    actual_amount_received: Some(Decimal::from(480)),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(deposit.variance, Some(Decimal::from(-20)));
        assert_eq!(deposit.status, DepositStatus::Recorded);

        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_not_collected_requires_reason() {
        let (ledger, _temp) = test_ledger().await;
        let builder = DepositBuilder::new(ledger.handle());

        let a = handed_over_order(&ledger, "asm-1", 500, None).await;
        let b = handed_over_order(&ledger, "asm-1", 300, None).await;

        let err = builder
            .create_deposit(
                ActorId::new("asm-1"),
                vec![
                    OrderCollectionData::collected(a),
                    // Explicit NotCollected with no reason and no marker
                    OrderCollectionData {
                        order_id: b,
                        status: Some(CollectionStatus::NotCollected),
                        reason: None,
                    },
                ],
                Utc::now(),
                DepositDetails::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        ledger.shutdown().await.unwrap();
    }
}
