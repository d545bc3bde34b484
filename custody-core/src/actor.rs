//! Actor-based concurrency for the custody ledger
//!
//! Single-writer pattern using a Tokio actor: every mutation flows through
//! one task, so guard re-checks and the storage batch happen without any
//! interleaving writer. Reads go through the same mailbox and therefore
//! observe fully committed state only.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │        Callers (bundling, deposit-engine, ...)       │
//! └─────────────────────┬────────────────────────────────┘
//!                       │
//!                       │ CustodyHandle (Clone)
//!                       ▼
//! ┌──────────────────────────────────────────────────────┐
//! │              mpsc::channel (bounded)                  │
//! └─────────────────────┬────────────────────────────────┘
//!                       │
//!                       ▼
//! ┌──────────────────────────────────────────────────────┐
//! │            CustodyActor (single task)                 │
//! │   guards → reducer → WriteSet → Storage::write_set   │
//! └──────────────────────────────────────────────────────┘
//! ```

use crate::plan::{CommitPlan, Guard, OrderPatch};
use crate::query::OrderPredicate;
use crate::reducer::{self, Applied};
use crate::storage::WriteSet;
use crate::types::{CustodyAction, CustodyEvent, Deposit, Order, RiderBundle, Superbundle};
use crate::{Error, Metrics, Result, Storage};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

/// Message sent to the custody actor
pub enum CustodyMessage {
    /// Register a new order (ingestion boundary)
    SeedOrder {
        order: Order,
        response: oneshot::Sender<Result<Order>>,
    },

    /// Apply a single custody event
    SubmitEvent {
        event: CustodyEvent,
        response: oneshot::Sender<Result<Order>>,
    },

    /// Execute a multi-order commit plan atomically
    Commit {
        plan: CommitPlan,
        response: oneshot::Sender<Result<()>>,
    },

    /// Get an order projection
    GetOrder {
        order_id: Uuid,
        response: oneshot::Sender<Result<Order>>,
    },

    /// Get an order's event history, oldest first
    GetOrderEvents {
        order_id: Uuid,
        response: oneshot::Sender<Result<Vec<CustodyEvent>>>,
    },

    /// List orders matching a predicate
    ListOrders {
        predicate: OrderPredicate,
        response: oneshot::Sender<Result<Vec<Order>>>,
    },

    /// Rebuild an order projection by replaying its event log
    RebuildOrder {
        order_id: Uuid,
        response: oneshot::Sender<Result<Order>>,
    },

    /// Get a bundle
    GetBundle {
        bundle_id: Uuid,
        response: oneshot::Sender<Result<RiderBundle>>,
    },

    /// Get a superbundle
    GetSuperbundle {
        superbundle_id: Uuid,
        response: oneshot::Sender<Result<Superbundle>>,
    },

    /// Get a deposit
    GetDeposit {
        deposit_id: Uuid,
        response: oneshot::Sender<Result<Deposit>>,
    },

    /// Shutdown actor
    Shutdown,
}

/// Actor that processes custody messages
pub struct CustodyActor {
    storage: Arc<Storage>,
    mailbox: mpsc::Receiver<CustodyMessage>,
    metrics: Metrics,
}

impl CustodyActor {
    /// Create new actor
    pub fn new(
        storage: Arc<Storage>,
        mailbox: mpsc::Receiver<CustodyMessage>,
        metrics: Metrics,
    ) -> Self {
        Self {
            storage,
            mailbox,
            metrics,
        }
    }

    /// Run the actor event loop
    pub async fn run(mut self) {
        while let Some(msg) = self.mailbox.recv().await {
            match msg {
                CustodyMessage::Shutdown => break,
                _ => self.handle_message(msg),
            }
        }
        tracing::info!("Custody actor stopped");
    }

    fn handle_message(&mut self, msg: CustodyMessage) {
        match msg {
            CustodyMessage::SeedOrder { order, response } => {
                let _ = response.send(self.seed_order(order));
            }

            CustodyMessage::SubmitEvent { event, response } => {
                let _ = response.send(self.submit_event(event));
            }

            CustodyMessage::Commit { plan, response } => {
                let start = Instant::now();
                let result = self.execute_plan(plan);
                self.metrics
                    .record_commit_duration(start.elapsed().as_secs_f64());
                if matches!(result, Err(Error::PreconditionFailed(_))) {
                    self.metrics.record_precondition_failure();
                }
                let _ = response.send(result);
            }

            CustodyMessage::GetOrder { order_id, response } => {
                let _ = response.send(self.storage.get_order(order_id));
            }

            CustodyMessage::GetOrderEvents { order_id, response } => {
                let _ = response.send(self.storage.get_order_events(order_id));
            }

            CustodyMessage::ListOrders {
                predicate,
                response,
            } => {
                let result = self.storage.list_orders().map(|orders| {
                    orders
                        .into_iter()
                        .filter(|o| predicate.matches(o))
                        .collect()
                });
                let _ = response.send(result);
            }

            CustodyMessage::RebuildOrder { order_id, response } => {
                let _ = response.send(self.rebuild_order(order_id));
            }

            CustodyMessage::GetBundle {
                bundle_id,
                response,
            } => {
                let _ = response.send(self.storage.get_bundle(bundle_id));
            }

            CustodyMessage::GetSuperbundle {
                superbundle_id,
                response,
            } => {
                let _ = response.send(self.storage.get_superbundle(superbundle_id));
            }

            CustodyMessage::GetDeposit {
                deposit_id,
                response,
            } => {
                let _ = response.send(self.storage.get_deposit(deposit_id));
            }

            CustodyMessage::Shutdown => {}
        }
    }

    fn seed_order(&self, order: Order) -> Result<Order> {
        // Seeding is idempotent on the order id; a re-seed returns the
        // existing projection untouched.
        match self.storage.get_order(order.order_id) {
            Ok(existing) => Ok(existing),
            Err(Error::OrderNotFound(_)) => {
                self.storage.put_order(&order)?;
                tracing::info!(
                    order_id = %order.order_id,
                    money_state = %order.money_state,
                    "Order seeded"
                );
                Ok(order)
            }
            Err(e) => Err(e),
        }
    }

    fn submit_event(&self, event: CustodyEvent) -> Result<Order> {
        let order = self.storage.get_order(event.order_id)?;

        match reducer::apply(&order, &event)? {
            Applied::Changed(next) => {
                let set = WriteSet {
                    events: vec![event.clone()],
                    orders: vec![next.clone()],
                    ..Default::default()
                };
                self.storage.write_set(&set)?;

                self.record_applied(&event);
                tracing::info!(
                    order_id = %next.order_id,
                    event_id = %event.event_id,
                    action = event.action.kind(),
                    money_state = %next.money_state,
                    "Event applied"
                );
                Ok(next)
            }
            Applied::NoOp => {
                self.metrics.record_noop();
                tracing::debug!(
                    order_id = %order.order_id,
                    event_id = %event.event_id,
                    "Duplicate event absorbed"
                );
                Ok(order)
            }
        }
    }

    fn record_applied(&self, event: &CustodyEvent) {
        self.metrics.record_event(event.action.kind());
        if let CustodyAction::Reconciliation { matched } = event.action {
            if matched {
                self.metrics.orders_reconciled_total.inc();
            } else {
                self.metrics.reconciliation_exceptions_total.inc();
            }
        }
    }

    /// Execute a commit plan: re-check guards, reduce events, write once
    fn execute_plan(&self, plan: CommitPlan) -> Result<()> {
        for guard in &plan.guards {
            self.check_guard(guard)?;
        }

        // Orders mutated by this plan, keyed by id so several events on the
        // same order chain correctly.
        let mut touched: HashMap<Uuid, Order> = HashMap::new();
        let mut applied_events = Vec::new();

        for event in plan.events {
            let order = match touched.get(&event.order_id) {
                Some(o) => o.clone(),
                None => self.storage.get_order(event.order_id)?,
            };

            match reducer::apply(&order, &event)? {
                Applied::Changed(next) => {
                    touched.insert(next.order_id, next);
                    applied_events.push(event);
                }
                Applied::NoOp => {
                    self.metrics.record_noop();
                }
            }
        }

        for patch in plan.order_patches {
            match patch {
                OrderPatch::AssignBundle {
                    order_id,
                    bundle_id,
                } => {
                    let mut order = match touched.get(&order_id) {
                        Some(o) => o.clone(),
                        None => self.storage.get_order(order_id)?,
                    };
                    order.bundle_id = bundle_id;
                    touched.insert(order_id, order);
                }
            }
        }

        let set = WriteSet {
            events: applied_events,
            orders: touched.into_values().collect(),
            bundles: plan.bundles,
            superbundles: plan.superbundles,
            deposits: plan.deposits,
        };
        self.storage.write_set(&set)?;

        for event in &set.events {
            self.record_applied(event);
        }

        Ok(())
    }

    fn check_guard(&self, guard: &Guard) -> Result<()> {
        match guard {
            Guard::OrderStateIn { order_id, expected } => {
                let order = self.storage.get_order(*order_id)?;
                if !expected.contains(&order.money_state) {
                    return Err(Error::PreconditionFailed(format!(
                        "order {} is {}, expected one of {:?}",
                        order_id, order.money_state, expected
                    )));
                }
            }
            Guard::OrderUnbundled { order_id } => {
                let order = self.storage.get_order(*order_id)?;
                if let Some(bundle_id) = order.bundle_id {
                    return Err(Error::PreconditionFailed(format!(
                        "order {} already belongs to bundle {}",
                        order_id, bundle_id
                    )));
                }
            }
            Guard::OrderInBundle {
                order_id,
                bundle_id,
            } => {
                let order = self.storage.get_order(*order_id)?;
                if order.bundle_id != Some(*bundle_id) {
                    return Err(Error::PreconditionFailed(format!(
                        "order {} is not in bundle {}",
                        order_id, bundle_id
                    )));
                }
            }
            Guard::BundleStatusIn {
                bundle_id,
                expected,
            } => {
                let bundle = self.storage.get_bundle(*bundle_id)?;
                if !expected.contains(&bundle.status) {
                    return Err(Error::PreconditionFailed(format!(
                        "bundle {} is {:?}, expected one of {:?}",
                        bundle_id, bundle.status, expected
                    )));
                }
            }
            Guard::SuperbundleStatusIn {
                superbundle_id,
                expected,
            } => {
                let superbundle = self.storage.get_superbundle(*superbundle_id)?;
                if !expected.contains(&superbundle.status) {
                    return Err(Error::PreconditionFailed(format!(
                        "superbundle {} is {:?}, expected one of {:?}",
                        superbundle_id, superbundle.status, expected
                    )));
                }
            }
            Guard::DepositStatusIn {
                deposit_id,
                expected,
            } => {
                let deposit = self.storage.get_deposit(*deposit_id)?;
                if !expected.contains(&deposit.status) {
                    return Err(Error::PreconditionFailed(format!(
                        "deposit {} is {:?}, expected one of {:?}",
                        deposit_id, deposit.status, expected
                    )));
                }
            }
        }
        Ok(())
    }

    /// Replay an order's event log from its seed state
    ///
    /// Bundle membership is bookkeeping outside the event log and is
    /// preserved across the rebuild.
    fn rebuild_order(&self, order_id: Uuid) -> Result<Order> {
        let current = self.storage.get_order(order_id)?;
        let events = self.storage.get_order_events(order_id)?;

        let mut order = Order::new(
            current.order_id,
            current.payment_type,
            current.cod_type,
            current.cod_amount,
        );
        order.created_at = current.created_at;
        order.updated_at = current.created_at;
        order.bundle_id = current.bundle_id;

        for event in &events {
            if let Applied::Changed(next) = reducer::apply(&order, event)? {
                order = next;
            }
        }

        self.storage.put_order(&order)?;
        tracing::info!(
            order_id = %order_id,
            events = events.len(),
            money_state = %order.money_state,
            "Order projection rebuilt"
        );
        Ok(order)
    }
}

/// Handle for sending messages to the actor
#[derive(Clone)]
pub struct CustodyHandle {
    sender: mpsc::Sender<CustodyMessage>,
}

impl CustodyHandle {
    /// Create new handle
    pub fn new(sender: mpsc::Sender<CustodyMessage>) -> Self {
        Self { sender }
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<Result<T>>) -> CustodyMessage,
    ) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(make(tx))
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;

        rx.await
            .map_err(|_| Error::Concurrency("Response channel closed".to_string()))?
    }

    /// Register a new order
    pub async fn seed_order(&self, order: Order) -> Result<Order> {
        self.request(|tx| CustodyMessage::SeedOrder {
            order,
            response: tx,
        })
        .await
    }

    /// Apply a single custody event
    pub async fn submit_event(&self, event: CustodyEvent) -> Result<Order> {
        self.request(|tx| CustodyMessage::SubmitEvent {
            event,
            response: tx,
        })
        .await
    }

    /// Execute a commit plan atomically
    pub async fn commit(&self, plan: CommitPlan) -> Result<()> {
        self.request(|tx| CustodyMessage::Commit { plan, response: tx })
            .await
    }

    /// Get an order projection
    pub async fn get_order(&self, order_id: Uuid) -> Result<Order> {
        self.request(|tx| CustodyMessage::GetOrder {
            order_id,
            response: tx,
        })
        .await
    }

    /// Get an order's event history
    pub async fn get_order_events(&self, order_id: Uuid) -> Result<Vec<CustodyEvent>> {
        self.request(|tx| CustodyMessage::GetOrderEvents {
            order_id,
            response: tx,
        })
        .await
    }

    /// List orders matching a predicate
    pub async fn list_orders(&self, predicate: OrderPredicate) -> Result<Vec<Order>> {
        self.request(|tx| CustodyMessage::ListOrders {
            predicate,
            response: tx,
        })
        .await
    }

    /// Rebuild an order projection from its event log
    pub async fn rebuild_order(&self, order_id: Uuid) -> Result<Order> {
        self.request(|tx| CustodyMessage::RebuildOrder {
            order_id,
            response: tx,
        })
        .await
    }

    /// Get a bundle
    pub async fn get_bundle(&self, bundle_id: Uuid) -> Result<RiderBundle> {
        self.request(|tx| CustodyMessage::GetBundle {
            bundle_id,
            response: tx,
        })
        .await
    }

    /// Get a superbundle
    pub async fn get_superbundle(&self, superbundle_id: Uuid) -> Result<Superbundle> {
        self.request(|tx| CustodyMessage::GetSuperbundle {
            superbundle_id,
            response: tx,
        })
        .await
    }

    /// Get a deposit
    pub async fn get_deposit(&self, deposit_id: Uuid) -> Result<Deposit> {
        self.request(|tx| CustodyMessage::GetDeposit {
            deposit_id,
            response: tx,
        })
        .await
    }

    /// Shutdown actor
    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(CustodyMessage::Shutdown)
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;
        Ok(())
    }
}

/// Spawn the custody actor
pub fn spawn_custody_actor(
    storage: Arc<Storage>,
    metrics: Metrics,
    mailbox_capacity: usize,
) -> CustodyHandle {
    let (tx, rx) = mpsc::channel(mailbox_capacity); // Bounded for backpressure
    let actor = CustodyActor::new(storage, rx, metrics);

    tokio::spawn(async move {
        actor.run().await;
    });

    CustodyHandle::new(tx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ActorId, CodType, CustodyAction, MoneyState, PaymentType};
    use crate::Config;
    use rust_decimal::Decimal;

    async fn test_handle() -> (CustodyHandle, tempfile::TempDir) {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();

        let storage = Arc::new(Storage::open(&config).unwrap());
        let handle = spawn_custody_actor(storage, Metrics::new().unwrap(), 64);
        (handle, temp_dir)
    }

    fn cod_order(amount: i64) -> Order {
        Order::new(
            Uuid::new_v4(),
            PaymentType::Cod,
            Some(CodType::HardCash),
            Decimal::from(amount),
        )
    }

    #[tokio::test]
    async fn test_seed_is_idempotent() {
        let (handle, _temp) = test_handle().await;

        let order = cod_order(500);
        let seeded = handle.seed_order(order.clone()).await.unwrap();
        assert_eq!(seeded.money_state, MoneyState::Uncollected);

        // Re-seed with a mutated copy returns the stored projection
        let mut reseed = order.clone();
        reseed.cod_amount = Decimal::from(999);
        let again = handle.seed_order(reseed).await.unwrap();
        assert_eq!(again.cod_amount, Decimal::from(500));

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_submit_event_advances_state() {
        let (handle, _temp) = test_handle().await;

        let order = handle.seed_order(cod_order(500)).await.unwrap();
        let event = CustodyEvent::new(
            order.order_id,
            CustodyAction::RiderCollection {
                rider: ActorId::new("rider-1"),
                collected_amount: None,
            },
        );

        let next = handle.submit_event(event.clone()).await.unwrap();
        assert_eq!(next.money_state, MoneyState::CollectedByRider);

        // Redelivery is absorbed
        let same = handle.submit_event(event).await.unwrap();
        assert_eq!(same.money_state, MoneyState::CollectedByRider);
        assert_eq!(same.event_ids.len(), 1);

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_commit_guard_rejects_stale_plan() {
        let (handle, _temp) = test_handle().await;

        let order = handle.seed_order(cod_order(500)).await.unwrap();

        // Plan built against UNCOLLECTED while the order already advanced
        handle
            .submit_event(CustodyEvent::new(
                order.order_id,
                CustodyAction::RiderCollection {
                    rider: ActorId::new("rider-1"),
                    collected_amount: None,
                },
            ))
            .await
            .unwrap();

        let plan = CommitPlan::new().guard(Guard::OrderStateIn {
            order_id: order.order_id,
            expected: vec![MoneyState::Uncollected],
        });

        let err = handle.commit(plan).await.unwrap_err();
        assert!(matches!(err, Error::PreconditionFailed(_)));

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_commit_applies_events_and_patches() {
        let (handle, _temp) = test_handle().await;

        let a = handle.seed_order(cod_order(300)).await.unwrap();
        let b = handle.seed_order(cod_order(700)).await.unwrap();
        let bundle_id = Uuid::new_v4();

        let plan = CommitPlan::new()
            .guard(Guard::OrderUnbundled {
                order_id: a.order_id,
            })
            .guard(Guard::OrderUnbundled {
                order_id: b.order_id,
            })
            .event(CustodyEvent::new(
                a.order_id,
                CustodyAction::RiderCollection {
                    rider: ActorId::new("rider-1"),
                    collected_amount: None,
                },
            ))
            .patch(OrderPatch::AssignBundle {
                order_id: a.order_id,
                bundle_id: Some(bundle_id),
            })
            .patch(OrderPatch::AssignBundle {
                order_id: b.order_id,
                bundle_id: Some(bundle_id),
            });

        handle.commit(plan).await.unwrap();

        let a2 = handle.get_order(a.order_id).await.unwrap();
        let b2 = handle.get_order(b.order_id).await.unwrap();
        assert_eq!(a2.money_state, MoneyState::CollectedByRider);
        assert_eq!(a2.bundle_id, Some(bundle_id));
        assert_eq!(b2.bundle_id, Some(bundle_id));

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_rebuild_matches_projection() {
        let (handle, _temp) = test_handle().await;

        let order = handle.seed_order(cod_order(500)).await.unwrap();
        handle
            .submit_event(CustodyEvent::new(
                order.order_id,
                CustodyAction::RiderCollection {
                    rider: ActorId::new("rider-1"),
                    collected_amount: Some(Decimal::from(450)),
                },
            ))
            .await
            .unwrap();
        handle
            .submit_event(CustodyEvent::new(
                order.order_id,
                CustodyAction::AsmHandover {
                    asm: ActorId::new("asm-1"),
                    collected_amount: None,
                    proof_ref: None,
                },
            ))
            .await
            .unwrap();

        let before = handle.get_order(order.order_id).await.unwrap();
        let rebuilt = handle.rebuild_order(order.order_id).await.unwrap();

        assert_eq!(rebuilt.money_state, before.money_state);
        assert_eq!(rebuilt.collected_amount, before.collected_amount);
        assert_eq!(rebuilt.event_ids, before.event_ids);

        handle.shutdown().await.unwrap();
    }
}
