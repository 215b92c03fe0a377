//! HTTP API for the Tally deposit engine.
//!
//! Provides endpoints for:
//! - Claim submission
//! - Claim lookup and synchronous verification
//! - Ledger balances
//! - Prometheus metrics

pub mod error;
pub mod handlers;
pub mod server;

pub use error::RpcError;
pub use server::{router, ApiState, DepositObserver, RpcServer};
