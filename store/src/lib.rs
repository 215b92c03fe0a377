//! Abstract storage traits for the deposit engine.
//!
//! Every storage backend (LMDB, in-memory for testing) implements these
//! traits. The rest of the codebase depends only on the traits.

pub mod claim;
pub mod error;
pub mod ledger;

pub use claim::{ClaimStore, DepositClaim, NewClaim};
pub use error::StoreError;
pub use ledger::{Balance, CreditOutcome, LedgerEntry, LedgerStore};
