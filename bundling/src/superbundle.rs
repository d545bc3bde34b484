//! Superbundle aggregation
//!
//! A superbundle is an ASM's roll-up of accepted rider bundles on its way
//! to a store manager. It is pure bookkeeping over bundles; order money
//! state never moves here, which is why conservation only needs to hold
//! over bundle amounts.

use crate::error::{Error, Result};
use chrono::Utc;
use custody_core::{
    actor::CustodyHandle, ActorId, BundleStatus, CommitPlan, Guard, Superbundle,
    SuperbundleStatus,
};
use reconciler::{reconcile, DenominationBreakdown};
use rust_decimal::Decimal;
use uuid::Uuid;

/// Superbundle aggregator
pub struct SuperbundleAggregator {
    handle: CustodyHandle,
    tolerance: Decimal,
}

impl SuperbundleAggregator {
    /// Create an aggregator over a custody ledger handle
    pub fn new(handle: CustodyHandle, tolerance: Decimal) -> Self {
        Self { handle, tolerance }
    }

    /// Roll accepted bundles of one ASM into a superbundle
    ///
    /// The default breakdown is the per-denomination sum of the
    /// constituent breakdowns; an override must still reconcile with the
    /// expected total.
    pub async fn create_superbundle(
        &self,
        asm: ActorId,
        bundle_ids: Vec<Uuid>,
        override_breakdown: Option<DenominationBreakdown>,
        digital_signoff: bool,
    ) -> Result<Superbundle> {
        if !digital_signoff {
            return Err(Error::Validation(
                "superbundle creation requires the ASM's digital signoff".to_string(),
            ));
        }
        if bundle_ids.is_empty() {
            return Err(Error::Validation(
                "superbundle must contain at least one bundle".to_string(),
            ));
        }
        let mut deduped = bundle_ids.clone();
        deduped.sort();
        deduped.dedup();
        if deduped.len() != bundle_ids.len() {
            return Err(Error::Validation(
                "superbundle contains duplicate bundle ids".to_string(),
            ));
        }

        let mut expected_amount = Decimal::ZERO;
        let mut merged = DenominationBreakdown::new();
        let mut bundles = Vec::with_capacity(bundle_ids.len());

        for bundle_id in &bundle_ids {
            let bundle = self.handle.get_bundle(*bundle_id).await?;

            if bundle.status != BundleStatus::HandedoverToAsm {
                return Err(Error::Validation(format!(
                    "bundle {} is {:?} and cannot join a superbundle",
                    bundle_id, bundle.status
                )));
            }
            if bundle.asm.as_ref() != Some(&asm) {
                return Err(Error::MultiActorViolation(format!(
                    "bundle {} is not held by ASM {}",
                    bundle_id, asm
                )));
            }

            expected_amount += bundle.validated_amount.unwrap_or(bundle.expected_amount);
            merged = merged.merge(&bundle.breakdown);
            bundles.push(bundle);
        }

        let breakdown = match override_breakdown {
            Some(explicit) => {
                let result = reconcile(&explicit, expected_amount, self.tolerance);
                if !result.matches {
                    return Err(Error::DenominationMismatch {
                        calculated: result.calculated,
                        expected: expected_amount,
                    });
                }
                explicit
            }
            None => merged,
        };

        let now = Utc::now();
        let superbundle = Superbundle {
            superbundle_id: Uuid::new_v4(),
            asm,
            bundle_ids: bundle_ids.clone(),
            expected_amount,
            breakdown,
            status: SuperbundleStatus::Created,
            deposit_id: None,
            created_at: now,
            updated_at: now,
        };

        let mut plan = CommitPlan::new();
        for mut bundle in bundles {
            plan = plan.guard(Guard::BundleStatusIn {
                bundle_id: bundle.bundle_id,
                expected: vec![BundleStatus::HandedoverToAsm],
            });

            bundle.status = BundleStatus::IncludedInSuperbundle;
            bundle.superbundle_id = Some(superbundle.superbundle_id);
            bundle.updated_at = now;
            plan = plan.bundle(bundle);
        }
        plan = plan.superbundle(superbundle.clone());

        self.handle.commit(plan).await?;

        tracing::info!(
            superbundle_id = %superbundle.superbundle_id,
            bundles = superbundle.bundle_ids.len(),
            expected = %superbundle.expected_amount,
            "Superbundle created"
        );
        Ok(superbundle)
    }

    /// ASM hands the superbundle to a store manager
    pub async fn mark_handedover_to_sm(&self, superbundle_id: Uuid) -> Result<Superbundle> {
        let mut superbundle = self.handle.get_superbundle(superbundle_id).await?;
        if superbundle.status != SuperbundleStatus::Created {
            return Err(Error::Validation(format!(
                "superbundle {} is {:?}, only a Created superbundle can be handed over",
                superbundle_id, superbundle.status
            )));
        }

        superbundle.status = SuperbundleStatus::HandedoverToSm;
        superbundle.updated_at = Utc::now();

        let plan = CommitPlan::new()
            .guard(Guard::SuperbundleStatusIn {
                superbundle_id,
                expected: vec![SuperbundleStatus::Created],
            })
            .superbundle(superbundle.clone());
        self.handle.commit(plan).await?;

        Ok(superbundle)
    }

    /// Link a superbundle to the bank deposit that carried its cash
    pub async fn attach_deposit(
        &self,
        superbundle_id: Uuid,
        deposit_id: Uuid,
    ) -> Result<Superbundle> {
        let mut superbundle = self.handle.get_superbundle(superbundle_id).await?;

        // Already linked to this deposit: idempotent
        if superbundle.status == SuperbundleStatus::Deposited {
            if superbundle.deposit_id == Some(deposit_id) {
                return Ok(superbundle);
            }
            return Err(Error::Validation(format!(
                "superbundle {} is already linked to deposit {:?}",
                superbundle_id, superbundle.deposit_id
            )));
        }

        // Referenced deposit must exist
        self.handle.get_deposit(deposit_id).await?;

        let linkable = [SuperbundleStatus::Created, SuperbundleStatus::HandedoverToSm];
        superbundle.status = SuperbundleStatus::Deposited;
        superbundle.deposit_id = Some(deposit_id);
        superbundle.updated_at = Utc::now();

        let plan = CommitPlan::new()
            .guard(Guard::SuperbundleStatusIn {
                superbundle_id,
                expected: linkable.to_vec(),
            })
            .superbundle(superbundle.clone());
        self.handle.commit(plan).await?;

        tracing::info!(
            superbundle_id = %superbundle_id,
            deposit_id = %deposit_id,
            "Superbundle linked to deposit"
        );
        Ok(superbundle)
    }
}
