//! The deposit verification and crediting engine.
//!
//! A user's claim ("I sent N tokens to address X in transaction H") is
//! checked against chain state by the [`DepositVerifier`], moved through its
//! lifecycle by the [`state_machine`], and credited to the ledger at most
//! once by the [`DepositProcessor`], which also owns per-claim locking,
//! retry budgets, backoff and the periodic sweep.

pub mod backoff;
pub mod config;
pub mod error;
pub mod locks;
pub mod processor;
pub mod state_machine;
pub mod verdict;
pub mod verifier;

pub use backoff::RetryPolicy;
pub use config::DepositConfig;
pub use error::{DepositError, TransitionError};
pub use locks::{ClaimGuard, ClaimLocks};
pub use processor::{Attempt, ClaimSubmission, DepositProcessor, SweepReport};
pub use state_machine::VerdictOutcome;
pub use verdict::VerificationVerdict;
pub use verifier::{DepositVerifier, VerificationRequest};
