//! Cash bundle and superbundle aggregation
//!
//! Rider bundles and ASM superbundles group orders of cash as they move up
//! the custody chain. Each aggregation step validates its whole batch,
//! reconciles the claimed denomination breakdown against the expected
//! total, and lands as a single atomic commit against the custody ledger.

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod bundle;
pub mod error;
pub mod superbundle;

// Re-exports
pub use bundle::BundleAggregator;
pub use error::{Error, Result};
pub use superbundle::SuperbundleAggregator;
