//! State enums for deposit claims and verification outcomes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a deposit claim.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimStatus {
    /// Submitted, waiting for (another) verification attempt.
    Pending,
    /// A verification attempt holds the claim.
    Verifying,
    /// Verified on chain; the ledger credit has not been confirmed yet.
    Verified,
    /// Ledger credited. Terminal.
    Credited,
    /// Definitively refused. Terminal.
    Rejected,
    /// Internal error; needs an operator.
    Failed,
}

impl ClaimStatus {
    /// Whether no further transition is possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Credited | Self::Rejected)
    }

    /// Whether the background sweep should pick this claim up.
    pub fn is_sweepable(&self) -> bool {
        matches!(self, Self::Pending | Self::Verifying | Self::Verified)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Verifying => "verifying",
            Self::Verified => "verified",
            Self::Credited => "credited",
            Self::Rejected => "rejected",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ClaimStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a verification attempt did not verify a claim.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictReason {
    /// No receipt yet: unmined, dropped or bogus hash.
    NotFound,
    /// The transaction reverted.
    TxFailed,
    /// No token transfer to the deposit address in the receipt.
    NoMatchingTransfer,
    /// The transferred amount is below the claimed amount.
    AmountMismatch,
    /// Mined, but not deep enough yet.
    InsufficientConfirmations,
    /// The chain node could not be reached or answered garbage.
    RpcUnavailable,
    /// Another claim already owns this transaction.
    DuplicateTxHash,
}

impl VerdictReason {
    /// Retryable reasons send the claim back to `Pending`, subject to the
    /// per-claim retry budget.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::NotFound
                | Self::NoMatchingTransfer
                | Self::InsufficientConfirmations
                | Self::RpcUnavailable
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::TxFailed => "tx_failed",
            Self::NoMatchingTransfer => "no_matching_transfer",
            Self::AmountMismatch => "amount_mismatch",
            Self::InsufficientConfirmations => "insufficient_confirmations",
            Self::RpcUnavailable => "rpc_unavailable",
            Self::DuplicateTxHash => "duplicate_tx_hash",
        }
    }

    /// Human-readable cause shown to users and operators.
    pub fn description(&self) -> &'static str {
        match self {
            Self::NotFound => "transaction not found on chain",
            Self::TxFailed => "transaction failed on chain",
            Self::NoMatchingTransfer => "no token transfer to the deposit address",
            Self::AmountMismatch => "transferred amount is less than the claimed amount",
            Self::InsufficientConfirmations => "waiting for more block confirmations",
            Self::RpcUnavailable => "chain node unavailable, will retry",
            Self::DuplicateTxHash => "transaction already claimed",
        }
    }
}

impl fmt::Display for VerdictReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_reasons_are_not_retryable() {
        assert!(!VerdictReason::TxFailed.is_retryable());
        assert!(!VerdictReason::AmountMismatch.is_retryable());
        assert!(!VerdictReason::DuplicateTxHash.is_retryable());
        assert!(VerdictReason::RpcUnavailable.is_retryable());
        assert!(VerdictReason::NoMatchingTransfer.is_retryable());
    }

    #[test]
    fn only_credited_and_rejected_are_terminal() {
        assert!(ClaimStatus::Credited.is_terminal());
        assert!(ClaimStatus::Rejected.is_terminal());
        assert!(!ClaimStatus::Failed.is_terminal());
        assert!(!ClaimStatus::Verified.is_terminal());
    }
}
