//! Atomic commit plans
//!
//! Aggregation steps (bundle acceptance, superbundle handover, deposit
//! creation) touch many orders at once and must land all-or-nothing. A
//! `CommitPlan` packages the guards, events and record writes of one such
//! step; the ledger actor re-checks the guards against current state and
//! applies everything in a single storage batch.

use crate::types::{
    BundleStatus, CustodyEvent, Deposit, DepositStatus, MoneyState, RiderBundle, Superbundle,
    SuperbundleStatus,
};
use uuid::Uuid;

/// Commit-time precondition, re-checked under the single writer
#[derive(Debug, Clone)]
pub enum Guard {
    /// Order must currently be in one of the listed states
    OrderStateIn {
        /// Guarded order
        order_id: Uuid,
        /// Acceptable states
        expected: Vec<MoneyState>,
    },
    /// Order must not belong to any live bundle
    OrderUnbundled {
        /// Guarded order
        order_id: Uuid,
    },
    /// Order must belong to exactly this bundle
    OrderInBundle {
        /// Guarded order
        order_id: Uuid,
        /// Required bundle
        bundle_id: Uuid,
    },
    /// Bundle must currently be in one of the listed statuses
    BundleStatusIn {
        /// Guarded bundle
        bundle_id: Uuid,
        /// Acceptable statuses
        expected: Vec<BundleStatus>,
    },
    /// Superbundle must currently be in one of the listed statuses
    SuperbundleStatusIn {
        /// Guarded superbundle
        superbundle_id: Uuid,
        /// Acceptable statuses
        expected: Vec<SuperbundleStatus>,
    },
    /// Deposit must currently be in one of the listed statuses
    DepositStatusIn {
        /// Guarded deposit
        deposit_id: Uuid,
        /// Acceptable statuses
        expected: Vec<DepositStatus>,
    },
}

/// Non-event bookkeeping applied alongside a plan
///
/// Bundle membership does not advance money state, so it rides on the
/// order record directly instead of going through the reducer.
#[derive(Debug, Clone)]
pub enum OrderPatch {
    /// Set or clear the order's bundle reference
    AssignBundle {
        /// Patched order
        order_id: Uuid,
        /// New bundle reference (None releases the order)
        bundle_id: Option<Uuid>,
    },
}

/// All-or-nothing unit of work for the ledger actor
#[derive(Debug, Clone, Default)]
pub struct CommitPlan {
    /// Preconditions, checked before anything is applied
    pub guards: Vec<Guard>,

    /// Custody events to run through the reducer
    pub events: Vec<CustodyEvent>,

    /// Order bookkeeping outside the event log
    pub order_patches: Vec<OrderPatch>,

    /// Bundle records to upsert
    pub bundles: Vec<RiderBundle>,

    /// Superbundle records to upsert
    pub superbundles: Vec<Superbundle>,

    /// Deposit records to upsert
    pub deposits: Vec<Deposit>,
}

impl CommitPlan {
    /// Empty plan
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a guard
    pub fn guard(mut self, guard: Guard) -> Self {
        self.guards.push(guard);
        self
    }

    /// Add a custody event
    pub fn event(mut self, event: CustodyEvent) -> Self {
        self.events.push(event);
        self
    }

    /// Add an order patch
    pub fn patch(mut self, patch: OrderPatch) -> Self {
        self.order_patches.push(patch);
        self
    }

    /// Add a bundle upsert
    pub fn bundle(mut self, bundle: RiderBundle) -> Self {
        self.bundles.push(bundle);
        self
    }

    /// Add a superbundle upsert
    pub fn superbundle(mut self, superbundle: Superbundle) -> Self {
        self.superbundles.push(superbundle);
        self
    }

    /// Add a deposit upsert
    pub fn deposit(mut self, deposit: Deposit) -> Self {
        self.deposits.push(deposit);
        self
    }

    /// Whether the plan writes anything
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
            && self.order_patches.is_empty()
            && self.bundles.is_empty()
            && self.superbundles.is_empty()
            && self.deposits.is_empty()
    }
}
