//! LMDB storage backend for the deposit engine.
//!
//! Implements the storage traits from `tally-store` using the `heed` LMDB
//! bindings. All logical stores share a single environment, so a claim and
//! its indexes, or a credit and the balance it moves, commit in one write
//! transaction.

pub mod claim;
pub mod environment;
pub mod error;
pub mod integrity;
mod keys;
pub mod ledger;
pub mod migration;

pub use claim::LmdbClaimStore;
pub use environment::LmdbEnvironment;
pub use error::LmdbError;
pub use integrity::{check_integrity, IntegrityReport};
pub use ledger::LmdbLedgerStore;
