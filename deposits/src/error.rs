use tally_store::StoreError;
use tally_types::{ChainAddress, ClaimId, ClaimStatus};
use thiserror::Error;

/// A lifecycle move the claim state machine does not allow.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("claim {id}: illegal transition {from} -> {to}")]
pub struct TransitionError {
    pub id: ClaimId,
    pub from: ClaimStatus,
    pub to: ClaimStatus,
}

#[derive(Debug, Error)]
pub enum DepositError {
    #[error("claim {0} not found")]
    ClaimNotFound(ClaimId),

    #[error("invalid claimed amount: {0}")]
    InvalidAmount(String),

    #[error("deposits must be sent to {expected}, not {actual}")]
    UnexpectedRecipient {
        expected: ChainAddress,
        actual: ChainAddress,
    },

    #[error("ledger entry for claim {id} disagrees with the claim: {detail}")]
    LedgerMismatch { id: ClaimId, detail: String },

    #[error("invalid deposit configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("storage error: {0}")]
    Store(#[from] StoreError),
}

impl DepositError {
    /// Whether the error comes from another writer moving the claim first.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Store(StoreError::Conflict { .. }))
    }
}
