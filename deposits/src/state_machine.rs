//! Claim lifecycle transitions.
//!
//! ```text
//! Pending -> Verifying -> Verified -> Credited
//!     ^          |  \
//!     +----------+   +-> Rejected
//! (Pending | Verifying | Verified) -> Failed
//! ```
//!
//! `Verifying -> Verifying` is allowed so that the sweep can take over a claim
//! whose attempt died with its process. All functions here are pure: they
//! change the in-memory claim and leave persistence to the caller.

use tally_store::DepositClaim;
use tally_types::{ClaimStatus, Timestamp, VerdictReason};

use crate::{RetryPolicy, TransitionError, VerificationVerdict};

/// What a verdict did to a claim.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VerdictOutcome {
    /// Verified on chain, ready to be credited.
    Verified,
    /// Back to `Pending` for another attempt.
    Retry(VerdictReason),
    /// Terminally refused.
    Rejected(VerdictReason),
}

fn is_allowed(from: ClaimStatus, to: ClaimStatus) -> bool {
    use ClaimStatus::*;
    matches!(
        (from, to),
        (Pending, Verifying)
            | (Verifying, Verifying)
            | (Verifying, Pending)
            | (Verifying, Rejected)
            | (Verifying, Verified)
            | (Verified, Credited)
            | (Pending | Verifying | Verified, Failed)
    )
}

/// Move `claim` to `to`, returning the status it had before.
pub fn transition(claim: &mut DepositClaim, to: ClaimStatus) -> Result<ClaimStatus, TransitionError> {
    let from = claim.status;
    if !is_allowed(from, to) {
        return Err(TransitionError {
            id: claim.id,
            from,
            to,
        });
    }
    claim.status = to;
    Ok(from)
}

/// Take the claim for a verification attempt.
pub fn begin_attempt(claim: &mut DepositClaim, now: Timestamp) -> Result<ClaimStatus, TransitionError> {
    let from = transition(claim, ClaimStatus::Verifying)?;
    claim.last_checked_at = Some(now);
    Ok(from)
}

/// Apply the verdict of the attempt that holds the claim.
///
/// Retryable reasons of a `counted` attempt spend the retry budgets of
/// `policy`; once a budget is used up the claim is rejected with the last
/// reason. An uncounted attempt, one made before the claim's backoff ran
/// out, leaves the counters alone and can only expire on the not-found
/// horizon.
pub fn apply_verdict(
    claim: &mut DepositClaim,
    verdict: &VerificationVerdict,
    policy: &RetryPolicy,
    now: Timestamp,
    counted: bool,
) -> Result<VerdictOutcome, TransitionError> {
    let mut next = claim.clone();
    next.last_checked_at = Some(now);
    next.confirmations = verdict.confirmations;
    if verdict.amount_on_chain.is_some() {
        next.amount_on_chain = verdict.amount_on_chain;
    }

    let outcome = match verdict.failure() {
        None => VerdictOutcome::Verified,
        Some(reason) if !reason.is_retryable() => VerdictOutcome::Rejected(reason),
        Some(reason) if !counted => {
            if reason == VerdictReason::NotFound && policy.is_exhausted(&next, reason, now) {
                VerdictOutcome::Rejected(reason)
            } else {
                VerdictOutcome::Retry(reason)
            }
        }
        Some(reason) => {
            next.attempts = next.attempts.saturating_add(1);
            if reason == VerdictReason::NoMatchingTransfer {
                next.no_match_attempts = next.no_match_attempts.saturating_add(1);
            }
            if policy.is_exhausted(&next, reason, now) {
                VerdictOutcome::Rejected(reason)
            } else {
                VerdictOutcome::Retry(reason)
            }
        }
    };

    match outcome {
        VerdictOutcome::Verified => {
            transition(&mut next, ClaimStatus::Verified)?;
            next.last_reason = None;
        }
        VerdictOutcome::Retry(reason) => {
            transition(&mut next, ClaimStatus::Pending)?;
            next.last_reason = Some(reason);
        }
        VerdictOutcome::Rejected(reason) => {
            transition(&mut next, ClaimStatus::Rejected)?;
            next.last_reason = Some(reason);
            next.rejection_reason = Some(reason);
        }
    }

    *claim = next;
    Ok(outcome)
}

/// Record a confirmed ledger credit.
pub fn mark_credited(claim: &mut DepositClaim, at: Timestamp) -> Result<(), TransitionError> {
    transition(claim, ClaimStatus::Credited)?;
    claim.credited_at = Some(at);
    Ok(())
}

/// Park the claim for an operator.
pub fn mark_failed(claim: &mut DepositClaim, detail: impl Into<String>) -> Result<(), TransitionError> {
    transition(claim, ClaimStatus::Failed)?;
    claim.failure = Some(detail.into());
    Ok(())
}
