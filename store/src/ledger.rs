//! The crediting ledger, as seen by the deposit engine.
//!
//! The engine never touches balances directly. It calls one atomic,
//! idempotent [`LedgerStore::credit`] keyed by claim id.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tally_types::{ClaimId, Timestamp, UserId};

use crate::StoreError;

/// Record of one applied credit. Exists at most once per claim id.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub claim_id: ClaimId,
    pub user_id: UserId,
    #[serde(with = "rust_decimal::serde::str")]
    pub amount: Decimal,
    pub credited_at: Timestamp,
}

/// A user's token balance.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    #[serde(with = "rust_decimal::serde::str")]
    pub balance: Decimal,
    /// Lifetime credits; never decreases.
    #[serde(with = "rust_decimal::serde::str")]
    pub total_earned: Decimal,
}

impl Balance {
    /// The balance after crediting `amount`.
    pub fn credited(&self, amount: Decimal) -> Result<Self, StoreError> {
        let overflow = || StoreError::Overflow(format!("crediting {amount}"));
        Ok(Self {
            balance: self.balance.checked_add(amount).ok_or_else(overflow)?,
            total_earned: self.total_earned.checked_add(amount).ok_or_else(overflow)?,
        })
    }
}

/// Result of a credit call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CreditOutcome {
    /// The balance was increased by this call.
    Applied(LedgerEntry),
    /// A credit with this idempotency key already existed; nothing changed.
    AlreadyApplied(LedgerEntry),
}

impl CreditOutcome {
    pub fn entry(&self) -> &LedgerEntry {
        match self {
            Self::Applied(entry) | Self::AlreadyApplied(entry) => entry,
        }
    }

    pub fn was_applied(&self) -> bool {
        matches!(self, Self::Applied(_))
    }
}

/// Atomic, idempotent crediting.
pub trait LedgerStore: Send + Sync {
    /// Increase `user_id`'s balance and total earned by `amount`, at most once
    /// per `key`.
    ///
    /// The balance update and the idempotency record commit together or not
    /// at all. A repeated call with the same key returns
    /// [`CreditOutcome::AlreadyApplied`] with the original entry.
    fn credit(
        &self,
        user_id: &UserId,
        amount: Decimal,
        key: ClaimId,
        at: Timestamp,
    ) -> Result<CreditOutcome, StoreError>;

    /// The credit recorded for `key`, if any.
    fn credit_for(&self, key: ClaimId) -> Result<Option<LedgerEntry>, StoreError>;

    /// Current balance of a user (zero when never credited).
    fn balance(&self, user_id: &UserId) -> Result<Balance, StoreError>;
}
