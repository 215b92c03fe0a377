//! Deposit claim records and their storage trait.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tally_types::{ChainAddress, ClaimId, ClaimStatus, Timestamp, TxHash, UserId, VerdictReason};

use crate::StoreError;

/// A user's submission, before the store assigns it an id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewClaim {
    pub user_id: UserId,
    pub tx_hash: TxHash,
    pub claimed_amount: Decimal,
    pub expected_recipient: ChainAddress,
    pub created_at: Timestamp,
}

/// One user-submitted assertion of an on-chain payment.
///
/// Claims are never deleted; rejected and credited claims stay as the audit
/// trail.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositClaim {
    pub id: ClaimId,
    pub user_id: UserId,
    pub tx_hash: TxHash,
    /// Token units the user says they sent.
    #[serde(with = "rust_decimal::serde::str")]
    pub claimed_amount: Decimal,
    /// Platform deposit address the transfer must go to.
    pub expected_recipient: ChainAddress,
    pub status: ClaimStatus,
    pub created_at: Timestamp,
    pub last_checked_at: Option<Timestamp>,
    /// Set once the claim is `Rejected`.
    pub rejection_reason: Option<VerdictReason>,
    /// Reason of the latest unsuccessful attempt, shown while `Pending`.
    pub last_reason: Option<VerdictReason>,
    /// Retryable attempts so far.
    pub attempts: u32,
    /// Attempts that found no matching transfer.
    pub no_match_attempts: u32,
    /// Amount found on chain by the latest attempt that got that far.
    #[serde(with = "rust_decimal::serde::str_option")]
    pub amount_on_chain: Option<Decimal>,
    pub confirmations: u64,
    pub credited_at: Option<Timestamp>,
    /// Operator-facing detail when the claim is `Failed`.
    pub failure: Option<String>,
}

impl DepositClaim {
    /// Build the stored record for a fresh submission.
    pub fn from_new(id: ClaimId, new: NewClaim, status: ClaimStatus) -> Self {
        let rejection_reason =
            (status == ClaimStatus::Rejected).then_some(VerdictReason::DuplicateTxHash);
        Self {
            id,
            user_id: new.user_id,
            tx_hash: new.tx_hash,
            claimed_amount: new.claimed_amount,
            expected_recipient: new.expected_recipient,
            status,
            created_at: new.created_at,
            last_checked_at: None,
            rejection_reason,
            last_reason: None,
            attempts: 0,
            no_match_attempts: 0,
            amount_on_chain: None,
            confirmations: 0,
            credited_at: None,
            failure: None,
        }
    }

    /// What crediting this claim adds to the ledger: the claimed amount,
    /// capped at the amount found on chain.
    pub fn credit_amount(&self) -> Decimal {
        match self.amount_on_chain {
            Some(on_chain) => self.claimed_amount.min(on_chain),
            None => self.claimed_amount,
        }
    }
}

/// Storage for deposit claims.
///
/// Implementations must enforce one owning claim per transaction hash.
pub trait ClaimStore: Send + Sync {
    /// Persist a new claim and assign its id, atomically.
    ///
    /// If another claim already owns `new.tx_hash`, the claim is still
    /// recorded (audit trail) but as `Rejected` with
    /// [`VerdictReason::DuplicateTxHash`], and the owner is unchanged.
    fn insert_claim(&self, new: NewClaim) -> Result<DepositClaim, StoreError>;

    /// Look up a claim by id.
    fn get_claim(&self, id: ClaimId) -> Result<Option<DepositClaim>, StoreError>;

    /// The claim that owns a transaction hash, if any.
    fn claim_by_tx_hash(&self, tx_hash: &TxHash) -> Result<Option<DepositClaim>, StoreError>;

    /// Overwrite a claim if its stored status is still `expected`.
    ///
    /// Fails with [`StoreError::Conflict`] when another writer moved the claim
    /// first, and [`StoreError::NotFound`] when it does not exist.
    fn update_claim(&self, claim: &DepositClaim, expected: ClaimStatus) -> Result<(), StoreError>;

    /// Up to `limit` claims in any of `statuses` with an id above `after`,
    /// oldest first. Pass the last id of one page as `after` for the next.
    fn claims_with_status(
        &self,
        statuses: &[ClaimStatus],
        after: Option<ClaimId>,
        limit: usize,
    ) -> Result<Vec<DepositClaim>, StoreError>;

    /// Number of claims in any of `statuses`.
    fn count_with_status(&self, statuses: &[ClaimStatus]) -> Result<u64, StoreError>;

    /// All claims submitted by a user, oldest first.
    fn claims_for_user(&self, user_id: &UserId) -> Result<Vec<DepositClaim>, StoreError>;

    /// Total number of claims.
    fn claim_count(&self) -> Result<u64, StoreError>;
}
