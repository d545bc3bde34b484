//! Cash Custody Core
//!
//! Event-sourced ledger tracking cash-on-delivery money from doorstep
//! collection through rider, area sales manager and bank deposit to
//! reconciliation.
//!
//! # Architecture
//!
//! - **Event Sourcing**: `money_state` is a projection of the append-only
//!   custody event log and can always be rebuilt by replay
//! - **Single Writer**: one actor task applies every mutation, so
//!   multi-order commits are race-free
//! - **Commit Plans**: aggregation steps package guards + events + records
//!   and land all-or-nothing
//!
//! # Invariants
//!
//! - Conservation: an aggregate's expected amount is exactly the sum of
//!   its parts at every boundary
//! - Deterministic replay: same events produce the same projection
//! - Append-only: events are never modified or deleted

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod actor;
pub mod config;
pub mod custody;
pub mod error;
pub mod metrics;
pub mod plan;
pub mod query;
pub mod reducer;
pub mod storage;
pub mod types;

// Re-exports
pub use config::Config;
pub use custody::CustodyLedger;
pub use error::{Error, Result};
pub use metrics::Metrics;
pub use plan::{CommitPlan, Guard, OrderPatch};
pub use query::OrderPredicate;
pub use storage::Storage;
pub use types::{
    ActorId, BundleStatus, CodType, CollectionStatus, CustodyAction, CustodyEvent, Deposit,
    DepositOrderRecord, DepositStatus, MoneyState, NonCollection, Order, PaymentType, RiderBundle,
    Superbundle, SuperbundleStatus, TerminalKind,
};
