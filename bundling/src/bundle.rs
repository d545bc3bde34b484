//! Rider bundle aggregation
//!
//! A bundle is the rider's sealed claim: "these orders, this much cash,
//! in these notes". Creation and acceptance both validate the whole batch
//! first and then land as a single commit plan, so a bundle never exists
//! half-applied.

use crate::error::{Error, Result};
use chrono::Utc;
use custody_core::{
    actor::CustodyHandle, ActorId, BundleStatus, CodType, CommitPlan, CustodyAction, CustodyEvent,
    Guard, MoneyState, Order, OrderPatch, RiderBundle,
};
use reconciler::{reconcile, DenominationBreakdown};
use rust_decimal::Decimal;
use uuid::Uuid;

/// Bundle aggregator
pub struct BundleAggregator {
    handle: CustodyHandle,
    tolerance: Decimal,
}

impl BundleAggregator {
    /// Create an aggregator over a custody ledger handle
    pub fn new(handle: CustodyHandle, tolerance: Decimal) -> Self {
        Self { handle, tolerance }
    }

    /// Seal a rider bundle over a set of collected orders
    ///
    /// The whole batch is validated before anything is written; orders keep
    /// their money state and only gain the bundle reference.
    pub async fn create_bundle(
        &self,
        rider: ActorId,
        order_ids: Vec<Uuid>,
        breakdown: DenominationBreakdown,
        photo_proofs: Vec<String>,
        digital_signoff: bool,
    ) -> Result<RiderBundle> {
        if !digital_signoff {
            return Err(Error::Validation(
                "bundle creation requires the rider's digital signoff".to_string(),
            ));
        }
        if order_ids.is_empty() {
            return Err(Error::Validation(
                "bundle must contain at least one order".to_string(),
            ));
        }
        let mut deduped = order_ids.clone();
        deduped.sort();
        deduped.dedup();
        if deduped.len() != order_ids.len() {
            return Err(Error::Validation(
                "bundle contains duplicate order ids".to_string(),
            ));
        }

        let mut expected_amount = Decimal::ZERO;
        for order_id in &order_ids {
            let order = self.handle.get_order(*order_id).await?;
            self.check_bundleable(&order, &rider)?;
            expected_amount += order.custody_amount();
        }

        let result = reconcile(&breakdown, expected_amount, self.tolerance);
        if !result.matches {
            return Err(Error::DenominationMismatch {
                calculated: result.calculated,
                expected: expected_amount,
            });
        }

        let now = Utc::now();
        let bundle = RiderBundle {
            bundle_id: Uuid::new_v4(),
            rider,
            asm: None,
            order_ids: order_ids.clone(),
            expected_amount,
            breakdown,
            validated_amount: None,
            status: BundleStatus::Created,
            photo_proofs,
            digital_signoff,
            rejection_reason: None,
            superbundle_id: None,
            created_at: now,
            updated_at: now,
        };

        let mut plan = CommitPlan::new();
        for order_id in &order_ids {
            plan = plan
                .guard(Guard::OrderStateIn {
                    order_id: *order_id,
                    expected: vec![MoneyState::CollectedByRider],
                })
                .guard(Guard::OrderUnbundled {
                    order_id: *order_id,
                })
                .patch(OrderPatch::AssignBundle {
                    order_id: *order_id,
                    bundle_id: Some(bundle.bundle_id),
                });
        }
        plan = plan.bundle(bundle.clone());

        self.handle.commit(plan).await?;

        tracing::info!(
            bundle_id = %bundle.bundle_id,
            rider = %bundle.rider,
            orders = bundle.order_ids.len(),
            expected = %bundle.expected_amount,
            "Bundle created"
        );
        Ok(bundle)
    }

    /// Rider declares the bundle ready to hand over
    pub async fn mark_ready(&self, bundle_id: Uuid) -> Result<RiderBundle> {
        let mut bundle = self.handle.get_bundle(bundle_id).await?;
        if bundle.status != BundleStatus::Created {
            return Err(Error::Validation(format!(
                "bundle {} is {:?}, only a Created bundle can be marked ready",
                bundle_id, bundle.status
            )));
        }

        bundle.status = BundleStatus::ReadyForHandover;
        bundle.updated_at = Utc::now();

        let plan = CommitPlan::new()
            .guard(Guard::BundleStatusIn {
                bundle_id,
                expected: vec![BundleStatus::Created],
            })
            .bundle(bundle.clone());
        self.handle.commit(plan).await?;

        Ok(bundle)
    }

    /// ASM counts the bundle and accepts custody of every order in it
    ///
    /// The recount must reconcile with the bundle's expected amount;
    /// acceptance then hands over all constituent orders in one commit.
    /// A mismatch rejects the acceptance and leaves the bundle untouched.
    pub async fn accept_bundle(
        &self,
        bundle_id: Uuid,
        asm: ActorId,
        actual_breakdown: DenominationBreakdown,
    ) -> Result<RiderBundle> {
        let mut bundle = self.handle.get_bundle(bundle_id).await?;
        let acceptable = [BundleStatus::Created, BundleStatus::ReadyForHandover];
        if !acceptable.contains(&bundle.status) {
            return Err(Error::Validation(format!(
                "bundle {} is {:?} and cannot be accepted",
                bundle_id, bundle.status
            )));
        }

        let result = reconcile(&actual_breakdown, bundle.expected_amount, self.tolerance);
        if !result.matches {
            tracing::warn!(
                bundle_id = %bundle_id,
                calculated = %result.calculated,
                expected = %result.expected,
                "Bundle acceptance rejected on recount"
            );
            return Err(Error::DenominationMismatch {
                calculated: result.calculated,
                expected: bundle.expected_amount,
            });
        }

        // The bundle's photo proof stands in for the per-order QR proof.
        let qr_proof = bundle.photo_proofs.first().cloned();

        let mut plan = CommitPlan::new().guard(Guard::BundleStatusIn {
            bundle_id,
            expected: acceptable.to_vec(),
        });

        for order_id in &bundle.order_ids {
            let order = self.handle.get_order(*order_id).await?;
            let proof_ref = if order.cod_type == Some(CodType::Qr) {
                if qr_proof.is_none() {
                    return Err(Error::Validation(format!(
                        "bundle {} holds QR order {} but carries no photo proof",
                        bundle_id, order_id
                    )));
                }
                qr_proof.clone()
            } else {
                None
            };

            plan = plan
                .guard(Guard::OrderInBundle {
                    order_id: *order_id,
                    bundle_id,
                })
                .guard(Guard::OrderStateIn {
                    order_id: *order_id,
                    expected: vec![MoneyState::CollectedByRider],
                })
                .event(CustodyEvent::new(
                    *order_id,
                    CustodyAction::AsmHandover {
                        asm: asm.clone(),
                        collected_amount: None,
                        proof_ref,
                    },
                ));
        }

        bundle.asm = Some(asm);
        bundle.validated_amount = Some(result.calculated);
        bundle.status = BundleStatus::HandedoverToAsm;
        bundle.updated_at = Utc::now();
        plan = plan.bundle(bundle.clone());

        self.handle.commit(plan).await?;

        tracing::info!(
            bundle_id = %bundle_id,
            validated = %result.calculated,
            orders = bundle.order_ids.len(),
            "Bundle accepted"
        );
        Ok(bundle)
    }

    /// Reject a bundle before acceptance, releasing its orders
    pub async fn reject_bundle(&self, bundle_id: Uuid, reason: impl Into<String>) -> Result<RiderBundle> {
        let reason = reason.into();
        if reason.trim().is_empty() {
            return Err(Error::Validation(
                "bundle rejection requires a reason".to_string(),
            ));
        }

        let mut bundle = self.handle.get_bundle(bundle_id).await?;
        let rejectable = [BundleStatus::Created, BundleStatus::ReadyForHandover];
        if !rejectable.contains(&bundle.status) {
            return Err(Error::Validation(format!(
                "bundle {} is {:?} and cannot be rejected",
                bundle_id, bundle.status
            )));
        }

        let mut plan = CommitPlan::new().guard(Guard::BundleStatusIn {
            bundle_id,
            expected: rejectable.to_vec(),
        });
        for order_id in &bundle.order_ids {
            plan = plan.patch(OrderPatch::AssignBundle {
                order_id: *order_id,
                bundle_id: None,
            });
        }

        bundle.status = BundleStatus::Rejected;
        bundle.rejection_reason = Some(reason);
        bundle.updated_at = Utc::now();
        plan = plan.bundle(bundle.clone());

        self.handle.commit(plan).await?;

        tracing::info!(bundle_id = %bundle_id, "Bundle rejected, orders released");
        Ok(bundle)
    }

    fn check_bundleable(&self, order: &Order, rider: &ActorId) -> Result<()> {
        if !order.in_custody_chain() {
            return Err(Error::Validation(format!(
                "order {} does not carry cash",
                order.order_id
            )));
        }
        if order.money_state != MoneyState::CollectedByRider {
            return Err(Error::Validation(format!(
                "order {} is {} and cannot be bundled",
                order.order_id, order.money_state
            )));
        }
        if order.rider.as_ref() != Some(rider) {
            return Err(Error::MultiActorViolation(format!(
                "order {} is not held by rider {}",
                order.order_id, rider
            )));
        }
        if let Some(existing) = order.bundle_id {
            return Err(Error::Validation(format!(
                "order {} already belongs to bundle {}",
                order.order_id, existing
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use custody_core::{Config, CustodyLedger, PaymentType};

    async fn test_ledger() -> (CustodyLedger, tempfile::TempDir) {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();
        (CustodyLedger::open(config).await.unwrap(), temp_dir)
    }

    async fn collected_order(
        ledger: &CustodyLedger,
        rider: &str,
        cod_type: CodType,
        amount: i64,
        collected: Option<i64>,
    ) -> Uuid {
        let order_id = Uuid::new_v4();
        ledger
            .seed_order(
                order_id,
                PaymentType::Cod,
                Some(cod_type),
                Decimal::from(amount),
            )
            .await
            .unwrap();
        ledger
            .record_rider_collection(
                order_id,
                ActorId::new(rider),
                collected.map(Decimal::from),
            )
            .await
            .unwrap();
        order_id
    }

    fn breakdown(counts: &[(i64, u32)]) -> DenominationBreakdown {
        DenominationBreakdown::from_counts(
            counts.iter().map(|(d, c)| (Decimal::from(*d), *c)),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_create_and_accept_moves_all_orders() {
        let (ledger, _temp) = test_ledger().await;
        let agg = BundleAggregator::new(ledger.handle(), ledger.tolerance());

        let a = collected_order(&ledger, "rider-1", CodType::HardCash, 500, None).await;
        let b = collected_order(&ledger, "rider-1", CodType::HardCash, 300, None).await;

        let bundle = agg
            .create_bundle(
                ActorId::new("rider-1"),
                vec![a, b],
                breakdown(&[(500, 1), (100, 3)]),
                vec!["photo-1.jpg".to_string()],
                true,
            )
            .await
            .unwrap();
        assert_eq!(bundle.expected_amount, Decimal::from(800));
        assert_eq!(bundle.status, BundleStatus::Created);

        // Orders stay CollectedByRider but carry the bundle ref
        let order = ledger.get_order(a).await.unwrap();
        assert_eq!(order.money_state, MoneyState::CollectedByRider);
        assert_eq!(order.bundle_id, Some(bundle.bundle_id));

        let accepted = agg
            .accept_bundle(
                bundle.bundle_id,
                ActorId::new("asm-1"),
                breakdown(&[(500, 1), (100, 3)]),
            )
            .await
            .unwrap();
        assert_eq!(accepted.status, BundleStatus::HandedoverToAsm);
        assert_eq!(accepted.validated_amount, Some(Decimal::from(800)));

        for order_id in [a, b] {
            let order = ledger.get_order(order_id).await.unwrap();
            assert_eq!(order.money_state, MoneyState::HandoverToAsm);
            assert_eq!(order.asm, Some(ActorId::new("asm-1")));
        }

        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_create_rejects_breakdown_mismatch() {
        let (ledger, _temp) = test_ledger().await;
        let agg = BundleAggregator::new(ledger.handle(), ledger.tolerance());

        let a = collected_order(&ledger, "rider-1", CodType::HardCash, 500, None).await;

        // Claims 490 against 500 expected
        let err = agg
            .create_bundle(
                ActorId::new("rider-1"),
                vec![a],
                breakdown(&[(100, 4), (50, 1), (20, 2)]),
                vec![],
                true,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DenominationMismatch { .. }));

        // Nothing was written
        let order = ledger.get_order(a).await.unwrap();
        assert_eq!(order.bundle_id, None);

        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_create_requires_signoff_and_single_rider() {
        let (ledger, _temp) = test_ledger().await;
        let agg = BundleAggregator::new(ledger.handle(), ledger.tolerance());

        let a = collected_order(&ledger, "rider-1", CodType::HardCash, 500, None).await;
        let b = collected_order(&ledger, "rider-2", CodType::HardCash, 200, None).await;

        let err = agg
            .create_bundle(
                ActorId::new("rider-1"),
                vec![a],
                breakdown(&[(500, 1)]),
                vec![],
                false,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        let err = agg
            .create_bundle(
                ActorId::new("rider-1"),
                vec![a, b],
                breakdown(&[(500, 1), (200, 1)]),
                vec![],
                true,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MultiActorViolation(_)));

        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_accept_mismatch_leaves_bundle_untouched() {
        let (ledger, _temp) = test_ledger().await;
        let agg = BundleAggregator::new(ledger.handle(), ledger.tolerance());

        let a = collected_order(&ledger, "rider-1", CodType::HardCash, 500, None).await;
        let bundle = agg
            .create_bundle(
                ActorId::new("rider-1"),
                vec![a],
                breakdown(&[(500, 1)]),
                vec![],
                true,
            )
            .await
            .unwrap();

        let err = agg
            .accept_bundle(
                bundle.bundle_id,
                ActorId::new("asm-1"),
                breakdown(&[(100, 4)]),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DenominationMismatch { .. }));

        let stored = ledger.get_bundle(bundle.bundle_id).await.unwrap();
        assert_eq!(stored.status, BundleStatus::Created);
        assert_eq!(
            ledger.get_order(a).await.unwrap().money_state,
            MoneyState::CollectedByRider
        );

        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_qr_order_requires_bundle_photo_proof() {
        let (ledger, _temp) = test_ledger().await;
        let agg = BundleAggregator::new(ledger.handle(), ledger.tolerance());

        let a = collected_order(&ledger, "rider-1", CodType::Qr, 250, None).await;
        let bundle = agg
            .create_bundle(
                ActorId::new("rider-1"),
                vec![a],
                breakdown(&[(250, 1)]),
                vec![],
                true,
            )
            .await
            .unwrap();

        let err = agg
            .accept_bundle(
                bundle.bundle_id,
                ActorId::new("asm-1"),
                breakdown(&[(250, 1)]),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_reject_releases_orders_for_rebundling() {
        let (ledger, _temp) = test_ledger().await;
        let agg = BundleAggregator::new(ledger.handle(), ledger.tolerance());

        let a = collected_order(&ledger, "rider-1", CodType::HardCash, 400, None).await;
        let bundle = agg
            .create_bundle(
                ActorId::new("rider-1"),
                vec![a],
                breakdown(&[(200, 2)]),
                vec![],
                true,
            )
            .await
            .unwrap();

        // Reason is mandatory
        let err = agg.reject_bundle(bundle.bundle_id, "  ").await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        let rejected = agg
            .reject_bundle(bundle.bundle_id, "note count did not match")
            .await
            .unwrap();
        assert_eq!(rejected.status, BundleStatus::Rejected);

        // Order is free again and can join a new bundle
        let order = ledger.get_order(a).await.unwrap();
        assert_eq!(order.bundle_id, None);
        assert_eq!(order.money_state, MoneyState::CollectedByRider);

        let second = agg
            .create_bundle(
                ActorId::new("rider-1"),
                vec![a],
                breakdown(&[(400, 1)]),
                vec![],
                true,
            )
            .await
            .unwrap();
        assert_eq!(second.order_ids, vec![a]);

        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_partial_collection_contributes_collected_amount() {
        let (ledger, _temp) = test_ledger().await;
        let agg = BundleAggregator::new(ledger.handle(), ledger.tolerance());

        // 1000 owed, 700 collected: the bundle expects 700
        let a = collected_order(&ledger, "rider-1", CodType::HardCash, 1000, Some(700)).await;

        let bundle = agg
            .create_bundle(
                ActorId::new("rider-1"),
                vec![a],
                breakdown(&[(500, 1), (100, 2)]),
                vec![],
                true,
            )
            .await
            .unwrap();
        assert_eq!(bundle.expected_amount, Decimal::from(700));

        ledger.shutdown().await.unwrap();
    }
}
