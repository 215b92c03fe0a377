//! Nullable infrastructure for deterministic testing.
//!
//! Every external dependency of the deposit engine (clock, chain node,
//! claim storage, ledger) sits behind a trait. This crate provides
//! test-friendly implementations that:
//! - Return deterministic values
//! - Can be scripted and inspected programmatically
//! - Never touch the filesystem or network
//!
//! Usage: swap real implementations for nullables in tests.

pub mod chain;
pub mod clock;
pub mod store;

pub use chain::{transfer_log, NullChain};
pub use clock::NullClock;
pub use store::{NullClaimStore, NullLedger};
