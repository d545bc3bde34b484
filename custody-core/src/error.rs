//! Error types for the custody ledger

use crate::types::MoneyState;
use thiserror::Error;
use uuid::Uuid;

/// Result type for custody operations
pub type Result<T> = std::result::Result<T, Error>;

/// Custody ledger errors
#[derive(Error, Debug)]
pub enum Error {
    /// Storage error (RocksDB)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Event precondition on money_state violated
    #[error("Invalid state transition: order {order_id} in {state} cannot accept {action}")]
    InvalidStateTransition {
        /// Order the event targeted
        order_id: Uuid,
        /// Current money state
        state: MoneyState,
        /// Rejected event kind
        action: &'static str,
    },

    /// Wrong rider/ASM attempting an action on an order they don't own
    #[error("Actor mismatch on order {order_id}: expected {expected}, got {got}")]
    ActorMismatch {
        /// Order the event targeted
        order_id: Uuid,
        /// Actor the order belongs to
        expected: String,
        /// Actor that attempted the action
        got: String,
    },

    /// Concurrent-modification race detected at commit time
    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    /// Missing or malformed mandatory field
    #[error("Validation error: {0}")]
    Validation(String),

    /// Order not found
    #[error("Order not found: {0}")]
    OrderNotFound(String),

    /// Event not found
    #[error("Event not found: {0}")]
    EventNotFound(String),

    /// Bundle not found
    #[error("Bundle not found: {0}")]
    BundleNotFound(String),

    /// Superbundle not found
    #[error("Superbundle not found: {0}")]
    SuperbundleNotFound(String),

    /// Deposit not found
    #[error("Deposit not found: {0}")]
    DepositNotFound(String),

    /// Concurrency error (actor mailbox closed, etc.)
    #[error("Concurrency error: {0}")]
    Concurrency(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::Storage(err.to_string())
    }
}

impl From<String> for Error {
    fn from(msg: String) -> Self {
        Error::Other(msg)
    }
}

impl From<&str> for Error {
    fn from(msg: &str) -> Self {
        Error::Other(msg.to_string())
    }
}
