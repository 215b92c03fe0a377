//! Pre-built [`tracing::Span`] constructors for common node operations.
//!
//! Consistent span names and field sets make traces easy to filter and
//! correlate across the API, the sweeper and startup reconciliation.

use tracing::{info_span, Span};

/// Span covering one verification of a transaction.
pub fn verify_span(tx_hash: &str) -> Span {
    info_span!("verify", tx_hash = %tx_hash)
}

/// Span covering one pass of the background sweep.
pub fn sweep_span(pass: u64) -> Span {
    info_span!("sweep", pass = pass)
}

/// Span covering startup reconciliation of verified claims.
pub fn reconcile_span() -> Span {
    info_span!("reconcile")
}

/// Span covering a single API action.
pub fn rpc_span(action: &str) -> Span {
    info_span!("rpc", action = %action)
}
