//! Core types for the custody ledger
//!
//! All types are designed for:
//! - Deterministic serialization (bincode)
//! - Memory safety (no unsafe code)
//! - Exact arithmetic (Decimal for money)

use chrono::{DateTime, Utc};
use reconciler::DenominationBreakdown;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// Actor identifier (rider, ASM or SM staff id)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActorId(String);

impl ActorId {
    /// Create new actor ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Payment type of an order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentType {
    /// Cash on delivery, paid to the rider
    Cod,
    /// Paid online before dispatch
    Prepaid,
}

/// COD collection channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CodType {
    /// Physical notes collected by the rider
    HardCash,
    /// QR/UPI payment scanned at the door
    Qr,
    /// Order cancelled before collection
    Cancelled,
    /// Returned to origin
    Rto,
}

impl CodType {
    /// Whether orders of this type carry cash through the custody chain
    pub fn in_custody_chain(&self) -> bool {
        matches!(self, CodType::HardCash | CodType::Qr)
    }
}

/// Per-order money state (derived from custody events)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum MoneyState {
    /// Cash not yet collected from the customer
    Uncollected = 1,
    /// Rider holds the cash
    CollectedByRider = 2,
    /// ASM holds the cash
    HandoverToAsm = 3,
    /// Cash deposited to bank, awaiting confirmation
    Deposited = 4,
    /// Bank credit confirmed (terminal)
    Reconciled = 5,
    /// Bank credit did not match; needs an operator (terminal-but-reversible)
    ReconciliationException = 6,
    /// Order cancelled before deposit (terminal)
    Cancelled = 7,
    /// Order returned to origin (terminal)
    Rto = 8,
}

impl MoneyState {
    /// Canonical storage token
    pub fn as_str(&self) -> &'static str {
        match self {
            MoneyState::Uncollected => "UNCOLLECTED",
            MoneyState::CollectedByRider => "COLLECTED_BY_RIDER",
            MoneyState::HandoverToAsm => "HANDOVER_TO_ASM",
            MoneyState::Deposited => "DEPOSITED",
            MoneyState::Reconciled => "RECONCILED",
            MoneyState::ReconciliationException => "RECONCILIATION_EXCEPTION",
            MoneyState::Cancelled => "CANCELLED",
            MoneyState::Rto => "RTO",
        }
    }

    /// Parse a storage token
    ///
    /// `PENDING_TO_DEPOSIT` is a historical alias of `HANDOVER_TO_ASM` and
    /// normalizes to it here; it never exists as a live state.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "UNCOLLECTED" => Some(MoneyState::Uncollected),
            "COLLECTED_BY_RIDER" => Some(MoneyState::CollectedByRider),
            "HANDOVER_TO_ASM" | "PENDING_TO_DEPOSIT" => Some(MoneyState::HandoverToAsm),
            "DEPOSITED" => Some(MoneyState::Deposited),
            "RECONCILED" => Some(MoneyState::Reconciled),
            "RECONCILIATION_EXCEPTION" => Some(MoneyState::ReconciliationException),
            "CANCELLED" => Some(MoneyState::Cancelled),
            "RTO" => Some(MoneyState::Rto),
            _ => None,
        }
    }

    /// Check if state is terminal
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            MoneyState::Reconciled | MoneyState::Cancelled | MoneyState::Rto
        )
    }

    /// States a cancellation/RTO may interrupt (everything before deposit)
    pub fn is_pre_deposit(&self) -> bool {
        matches!(
            self,
            MoneyState::Uncollected | MoneyState::CollectedByRider | MoneyState::HandoverToAsm
        )
    }
}

impl fmt::Display for MoneyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// External terminal input kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TerminalKind {
    /// Order cancelled
    Cancelled,
    /// Order returned to origin
    Rto,
}

impl TerminalKind {
    /// Money state this input moves the order to
    pub fn money_state(&self) -> MoneyState {
        match self {
            TerminalKind::Cancelled => MoneyState::Cancelled,
            TerminalKind::Rto => MoneyState::Rto,
        }
    }
}

/// ASM-recorded non-collection marker
///
/// Does not change money state; the Deposit Builder uses it to exclude the
/// order from the expected-amount computation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NonCollection {
    /// Why the cash could not be collected (mandatory, non-empty)
    pub reason: String,

    /// Whether collection may still happen later
    pub future_possible: bool,

    /// Expected collection date, if known
    pub expected_date: Option<DateTime<Utc>>,
}

/// Unit of custody
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    /// Order ID
    pub order_id: Uuid,

    /// Payment type
    pub payment_type: PaymentType,

    /// COD channel (None for prepaid orders)
    pub cod_type: Option<CodType>,

    /// Amount owed by the customer
    pub cod_amount: Decimal,

    /// Amount actually collected; may be less than cod_amount
    pub collected_amount: Option<Decimal>,

    /// Current money state (event-derived projection)
    pub money_state: MoneyState,

    /// Rider carrying the cash
    pub rider: Option<ActorId>,

    /// ASM the cash was handed to
    pub asm: Option<ActorId>,

    /// Rider bundle this order is sealed into
    pub bundle_id: Option<Uuid>,

    /// Bank deposit covering this order
    pub deposit_id: Option<Uuid>,

    /// Non-collection marker set by an ASM
    pub non_collection: Option<NonCollection>,

    /// Payment proof reference (mandatory for QR handovers, opaque)
    pub payment_proof: Option<String>,

    /// Created timestamp
    pub created_at: DateTime<Utc>,

    /// Rider collection timestamp
    pub collected_at: Option<DateTime<Utc>>,

    /// ASM handover timestamp
    pub handover_at: Option<DateTime<Utc>>,

    /// Deposit timestamp
    pub deposited_at: Option<DateTime<Utc>>,

    /// Reconciliation timestamp
    pub reconciled_at: Option<DateTime<Utc>>,

    /// Last updated timestamp
    pub updated_at: DateTime<Utc>,

    /// Event IDs applied to this order, in order
    pub event_ids: Vec<Uuid>,
}

impl Order {
    /// Create an order as the ingestion boundary would
    ///
    /// COD hard-cash/QR orders start UNCOLLECTED. Cancelled/RTO COD orders
    /// are terminal on arrival. Prepaid orders carry no cash and enter the
    /// ledger already reconciled.
    pub fn new(
        order_id: Uuid,
        payment_type: PaymentType,
        cod_type: Option<CodType>,
        cod_amount: Decimal,
    ) -> Self {
        let money_state = match (payment_type, cod_type) {
            (PaymentType::Prepaid, _) => MoneyState::Reconciled,
            (PaymentType::Cod, Some(CodType::Cancelled)) => MoneyState::Cancelled,
            (PaymentType::Cod, Some(CodType::Rto)) => MoneyState::Rto,
            (PaymentType::Cod, _) => MoneyState::Uncollected,
        };

        let now = Utc::now();
        Self {
            order_id,
            payment_type,
            cod_type,
            cod_amount,
            collected_amount: None,
            money_state,
            rider: None,
            asm: None,
            bundle_id: None,
            deposit_id: None,
            non_collection: None,
            payment_proof: None,
            created_at: now,
            collected_at: None,
            handover_at: None,
            deposited_at: None,
            reconciled_at: None,
            updated_at: now,
            event_ids: vec![],
        }
    }

    /// Whether this order carries cash through the custody chain
    pub fn in_custody_chain(&self) -> bool {
        self.payment_type == PaymentType::Cod
            && self.cod_type.map(|t| t.in_custody_chain()).unwrap_or(false)
    }

    /// Amount the order contributes to an aggregation
    pub fn custody_amount(&self) -> Decimal {
        self.collected_amount.unwrap_or(self.cod_amount)
    }

    /// max(0, cod_amount − collected_amount)
    pub fn collection_discrepancy(&self) -> Decimal {
        match self.collected_amount {
            Some(collected) => (self.cod_amount - collected).max(Decimal::ZERO),
            None => Decimal::ZERO,
        }
    }

    /// Whether collected_amount is present and below cod_amount
    pub fn is_partial_collection(&self) -> bool {
        self.collected_amount
            .map(|collected| collected < self.cod_amount)
            .unwrap_or(false)
    }

    /// Check if order is in a terminal money state
    pub fn is_terminal(&self) -> bool {
        self.money_state.is_terminal()
    }
}

/// Custody action recorded by an event
///
/// The payload carries everything the reducer needs; amounts never live
/// outside the event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CustodyAction {
    /// Rider collected cash from the customer
    RiderCollection {
        /// Collecting rider
        rider: ActorId,
        /// Amount collected; None means collected in full
        collected_amount: Option<Decimal>,
    },

    /// Rider handed cash to an ASM
    AsmHandover {
        /// Receiving ASM
        asm: ActorId,
        /// Corrected collected amount, if the ASM recounted
        collected_amount: Option<Decimal>,
        /// Payment proof reference (mandatory for QR orders)
        proof_ref: Option<String>,
    },

    /// ASM marked the order non-collected (no state change)
    NonCollection {
        /// Recording ASM
        asm: ActorId,
        /// Why the cash could not be collected (mandatory)
        reason: String,
        /// Whether collection may still happen
        future_possible: bool,
        /// Expected collection date, if known
        expected_date: Option<DateTime<Utc>>,
    },

    /// Order included in a bank deposit
    Deposit {
        /// Covering deposit
        deposit_id: Uuid,
    },

    /// Bank credit compared against the deposit
    Reconciliation {
        /// Whether the amounts matched within tolerance
        matched: bool,
    },

    /// External terminal input (cancellation/RTO)
    MarkedTerminal {
        /// Terminal kind
        kind: TerminalKind,
    },
}

impl CustodyAction {
    /// Action kind label for logs and errors
    pub fn kind(&self) -> &'static str {
        match self {
            CustodyAction::RiderCollection { .. } => "RIDER_COLLECTION",
            CustodyAction::AsmHandover { .. } => "ASM_HANDOVER",
            CustodyAction::NonCollection { .. } => "NON_COLLECTION",
            CustodyAction::Deposit { .. } => "DEPOSIT",
            CustodyAction::Reconciliation { .. } => "RECONCILIATION",
            CustodyAction::MarkedTerminal { .. } => "MARKED_TERMINAL",
        }
    }
}

/// Append-only custody event
///
/// The sole trigger for order money-state transitions; `money_state` is a
/// projection that can be rebuilt by replaying these.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustodyEvent {
    /// Unique event ID (UUIDv7 for time-ordering)
    pub event_id: Uuid,

    /// Order this event belongs to
    pub order_id: Uuid,

    /// Recorded action with payload
    pub action: CustodyAction,

    /// Free-form actor display name
    pub actor_name: Option<String>,

    /// Operator notes
    pub notes: Option<String>,

    /// Additional metadata
    #[serde(default)]
    pub metadata: HashMap<String, String>,

    /// Event timestamp
    pub recorded_at: DateTime<Utc>,
}

impl CustodyEvent {
    /// Create an event for an action, timestamped now
    pub fn new(order_id: Uuid, action: CustodyAction) -> Self {
        Self {
            event_id: Uuid::now_v7(),
            order_id,
            action,
            actor_name: None,
            notes: None,
            metadata: HashMap::new(),
            recorded_at: Utc::now(),
        }
    }
}

/// Rider bundle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum BundleStatus {
    /// Sealed by the rider
    Created = 1,
    /// Rider declared it ready to hand over
    ReadyForHandover = 2,
    /// ASM counted and accepted it
    HandedoverToAsm = 3,
    /// Rolled into a superbundle
    IncludedInSuperbundle = 4,
    /// Rejected before acceptance; orders released for re-bundling
    Rejected = 5,
}

/// A rider's sealed claim of physical cash for a set of orders
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiderBundle {
    /// Bundle ID
    pub bundle_id: Uuid,

    /// Rider that sealed the bundle
    pub rider: ActorId,

    /// ASM that accepted it (set at acceptance)
    pub asm: Option<ActorId>,

    /// Constituent orders
    pub order_ids: Vec<Uuid>,

    /// Σ over orders of (collected_amount ?? cod_amount)
    pub expected_amount: Decimal,

    /// Rider-declared note counts
    pub breakdown: DenominationBreakdown,

    /// ASM-confirmed total (set at acceptance)
    pub validated_amount: Option<Decimal>,

    /// Bundle status
    pub status: BundleStatus,

    /// Photo proof references (opaque)
    pub photo_proofs: Vec<String>,

    /// Rider digital signoff flag
    pub digital_signoff: bool,

    /// Mandatory reason when rejected
    pub rejection_reason: Option<String>,

    /// Superbundle this bundle was rolled into
    pub superbundle_id: Option<Uuid>,

    /// Created timestamp
    pub created_at: DateTime<Utc>,

    /// Last updated timestamp
    pub updated_at: DateTime<Utc>,
}

/// Superbundle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum SuperbundleStatus {
    /// Assembled by the ASM
    Created = 1,
    /// Handed to a store manager
    HandedoverToSm = 2,
    /// Linked to a bank deposit
    Deposited = 3,
}

/// An ASM's aggregation of accepted rider bundles
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Superbundle {
    /// Superbundle ID
    pub superbundle_id: Uuid,

    /// Owning ASM
    pub asm: ActorId,

    /// Constituent bundles
    pub bundle_ids: Vec<Uuid>,

    /// Σ over bundles of (validated_amount ?? expected_amount)
    pub expected_amount: Decimal,

    /// Aggregated (or overridden) note counts
    pub breakdown: DenominationBreakdown,

    /// Superbundle status
    pub status: SuperbundleStatus,

    /// Linked deposit, once deposited
    pub deposit_id: Option<Uuid>,

    /// Created timestamp
    pub created_at: DateTime<Utc>,

    /// Last updated timestamp
    pub updated_at: DateTime<Utc>,
}

/// Collection status of an order within a deposit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CollectionStatus {
    /// Cash for this order is part of the deposit
    Collected,
    /// Excluded from the deposit total, kept for audit
    NotCollected,
}

/// Per-order line of a deposit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepositOrderRecord {
    /// Order ID
    pub order_id: Uuid,

    /// Collected or not
    pub status: CollectionStatus,

    /// Non-collection reason, when excluded
    pub reason: Option<String>,

    /// Order's cash contribution (collected_amount ?? cod_amount)
    pub amount: Decimal,
}

/// Deposit status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum DepositStatus {
    /// Recorded, awaiting bank confirmation
    Recorded = 1,
    /// Bank credit matched
    Reconciled = 2,
    /// Bank credit mismatched; needs an operator
    Exception = 3,
}

/// An SM's bank-facing record of deposited cash
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deposit {
    /// Deposit ID
    pub deposit_id: Uuid,

    /// ASM whose orders this deposit draws from (exactly one)
    pub asm: ActorId,

    /// Ordered per-order collection records
    pub records: Vec<DepositOrderRecord>,

    /// Σ over COLLECTED records
    pub total_amount: Decimal,

    /// Same computation, kept separate for audit
    pub expected_amount: Decimal,

    /// SM-entered amount actually received
    pub actual_amount_received: Option<Decimal>,

    /// actual − expected, recorded when actual was supplied
    pub variance: Option<Decimal>,

    /// Deposit slip reference (opaque)
    pub deposit_slip_ref: Option<String>,

    /// Bank account deposited to
    pub bank_account: Option<String>,

    /// Bank reference number
    pub reference_number: Option<String>,

    /// Deposit date
    pub deposit_date: DateTime<Utc>,

    /// Bank-confirmed credit, set by reconciliation
    pub bank_confirmed_amount: Option<Decimal>,

    /// Deposit status
    pub status: DepositStatus,

    /// Created timestamp
    pub created_at: DateTime<Utc>,

    /// Reconciliation timestamp
    pub reconciled_at: Option<DateTime<Utc>>,
}

impl Deposit {
    /// Orders whose cash is part of this deposit
    pub fn collected_order_ids(&self) -> Vec<Uuid> {
        self.records
            .iter()
            .filter(|r| r.status == CollectionStatus::Collected)
            .map(|r| r.order_id)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_money_state_parse_merges_legacy_alias() {
        assert_eq!(
            MoneyState::parse("PENDING_TO_DEPOSIT"),
            Some(MoneyState::HandoverToAsm)
        );
        assert_eq!(
            MoneyState::parse("HANDOVER_TO_ASM"),
            Some(MoneyState::HandoverToAsm)
        );
        assert_eq!(MoneyState::parse("BOGUS"), None);
    }

    #[test]
    fn test_order_initial_states() {
        let cod = Order::new(
            Uuid::new_v4(),
            PaymentType::Cod,
            Some(CodType::HardCash),
            Decimal::from(500),
        );
        assert_eq!(cod.money_state, MoneyState::Uncollected);
        assert!(cod.in_custody_chain());

        let prepaid = Order::new(Uuid::new_v4(), PaymentType::Prepaid, None, Decimal::ZERO);
        assert!(prepaid.is_terminal());
        assert!(!prepaid.in_custody_chain());

        let rto = Order::new(
            Uuid::new_v4(),
            PaymentType::Cod,
            Some(CodType::Rto),
            Decimal::from(300),
        );
        assert_eq!(rto.money_state, MoneyState::Rto);
        assert!(!rto.in_custody_chain());
    }

    #[test]
    fn test_partial_collection_arithmetic() {
        let mut order = Order::new(
            Uuid::new_v4(),
            PaymentType::Cod,
            Some(CodType::HardCash),
            Decimal::from(1000),
        );

        assert!(!order.is_partial_collection());
        assert_eq!(order.collection_discrepancy(), Decimal::ZERO);

        order.collected_amount = Some(Decimal::from(700));
        assert!(order.is_partial_collection());
        assert_eq!(order.collection_discrepancy(), Decimal::from(300));
        assert_eq!(order.custody_amount(), Decimal::from(700));

        order.collected_amount = Some(Decimal::from(1000));
        assert!(!order.is_partial_collection());
        assert_eq!(order.collection_discrepancy(), Decimal::ZERO);
    }
}
