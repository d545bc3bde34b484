//! Main custody ledger orchestration layer
//!
//! Ties together storage, the reducer and the single-writer actor into a
//! high-level API for the custody chain.
//!
//! # Example
//!
//! ```no_run
//! use custody_core::{Config, CustodyLedger};
//!
//! #[tokio::main]
//! async fn main() -> custody_core::Result<()> {
//!     let config = Config::default();
//!     let ledger = CustodyLedger::open(config).await?;
//!
//!     // let order = ledger.seed_cod_order(...).await?;
//!     // ledger.record_rider_collection(order.order_id, ...).await?;
//!
//!     Ok(())
//! }
//! ```

use crate::{
    actor::{spawn_custody_actor, CustodyHandle},
    plan::CommitPlan,
    query::OrderPredicate,
    types::{
        ActorId, CodType, CustodyAction, CustodyEvent, Deposit, Order, PaymentType, RiderBundle,
        Superbundle, TerminalKind,
    },
    Config, Metrics, Result, Storage,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

/// Main custody ledger interface
pub struct CustodyLedger {
    /// Actor handle for all operations
    handle: CustodyHandle,

    /// Metrics collector
    metrics: Metrics,

    /// Configuration
    config: Config,
}

impl CustodyLedger {
    /// Open ledger with configuration
    pub async fn open(config: Config) -> Result<Self> {
        let storage = Arc::new(Storage::open(&config)?);
        let metrics = Metrics::new().map_err(|e| crate::Error::Other(e.to_string()))?;
        let handle = spawn_custody_actor(storage, metrics.clone(), config.mailbox_capacity);

        Ok(Self {
            handle,
            metrics,
            config,
        })
    }

    /// Actor handle for satellite crates
    pub fn handle(&self) -> CustodyHandle {
        self.handle.clone()
    }

    /// Configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Metrics collector
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Amount tolerance used across every reconciliation point
    pub fn tolerance(&self) -> Decimal {
        self.config.reconciliation.tolerance
    }

    // Ingestion

    /// Register an order (idempotent on order id)
    pub async fn seed_order(
        &self,
        order_id: Uuid,
        payment_type: PaymentType,
        cod_type: Option<CodType>,
        cod_amount: Decimal,
    ) -> Result<Order> {
        if cod_amount < Decimal::ZERO {
            return Err(crate::Error::Validation(format!(
                "cod_amount {} must not be negative",
                cod_amount
            )));
        }
        if payment_type == PaymentType::Cod && cod_type.is_none() {
            return Err(crate::Error::Validation(format!(
                "COD order {} requires a cod_type",
                order_id
            )));
        }

        self.handle
            .seed_order(Order::new(order_id, payment_type, cod_type, cod_amount))
            .await
    }

    // Custody events

    /// Rider collected cash from the customer
    pub async fn record_rider_collection(
        &self,
        order_id: Uuid,
        rider: ActorId,
        collected_amount: Option<Decimal>,
    ) -> Result<Order> {
        self.handle
            .submit_event(CustodyEvent::new(
                order_id,
                CustodyAction::RiderCollection {
                    rider,
                    collected_amount,
                },
            ))
            .await
    }

    /// Rider handed cash to an ASM (single-order path)
    pub async fn record_asm_handover(
        &self,
        order_id: Uuid,
        asm: ActorId,
        collected_amount: Option<Decimal>,
        proof_ref: Option<String>,
    ) -> Result<Order> {
        self.handle
            .submit_event(CustodyEvent::new(
                order_id,
                CustodyAction::AsmHandover {
                    asm,
                    collected_amount,
                    proof_ref,
                },
            ))
            .await
    }

    /// ASM marked the order non-collected
    pub async fn record_non_collection(
        &self,
        order_id: Uuid,
        asm: ActorId,
        reason: impl Into<String>,
        future_possible: bool,
        expected_date: Option<DateTime<Utc>>,
    ) -> Result<Order> {
        self.handle
            .submit_event(CustodyEvent::new(
                order_id,
                CustodyAction::NonCollection {
                    asm,
                    reason: reason.into(),
                    future_possible,
                    expected_date,
                },
            ))
            .await
    }

    /// External cancellation/RTO input
    pub async fn record_terminal(&self, order_id: Uuid, kind: TerminalKind) -> Result<Order> {
        self.handle
            .submit_event(CustodyEvent::new(
                order_id,
                CustodyAction::MarkedTerminal { kind },
            ))
            .await
    }

    // Commits and queries

    /// Execute a multi-order commit plan atomically
    pub async fn commit(&self, plan: CommitPlan) -> Result<()> {
        self.handle.commit(plan).await
    }

    /// Get an order projection
    pub async fn get_order(&self, order_id: Uuid) -> Result<Order> {
        self.handle.get_order(order_id).await
    }

    /// Get an order's event history, oldest first
    pub async fn get_order_events(&self, order_id: Uuid) -> Result<Vec<CustodyEvent>> {
        self.handle.get_order_events(order_id).await
    }

    /// List orders matching a predicate
    pub async fn list_orders(&self, predicate: OrderPredicate) -> Result<Vec<Order>> {
        self.handle.list_orders(predicate).await
    }

    /// Rebuild an order projection by replaying its event log
    pub async fn rebuild_order(&self, order_id: Uuid) -> Result<Order> {
        self.handle.rebuild_order(order_id).await
    }

    /// Get a bundle
    pub async fn get_bundle(&self, bundle_id: Uuid) -> Result<RiderBundle> {
        self.handle.get_bundle(bundle_id).await
    }

    /// Get a superbundle
    pub async fn get_superbundle(&self, superbundle_id: Uuid) -> Result<Superbundle> {
        self.handle.get_superbundle(superbundle_id).await
    }

    /// Get a deposit
    pub async fn get_deposit(&self, deposit_id: Uuid) -> Result<Deposit> {
        self.handle.get_deposit(deposit_id).await
    }

    /// Graceful shutdown
    pub async fn shutdown(&self) -> Result<()> {
        self.handle.shutdown().await
    }
}
