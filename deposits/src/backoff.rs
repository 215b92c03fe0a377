//! Retry budgets and exponential backoff between attempts.

use tally_store::DepositClaim;
use tally_types::{Timestamp, VerdictReason};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub retry_budget: u32,
    pub no_match_retry_budget: u32,
    pub not_found_horizon_secs: u64,
    pub cooldown_secs: u64,
    pub max_cooldown_secs: u64,
}

impl RetryPolicy {
    /// Whether a claim that just failed with retryable `reason` has used up
    /// its chances. Counters must already include the failed attempt.
    pub fn is_exhausted(&self, claim: &DepositClaim, reason: VerdictReason, now: Timestamp) -> bool {
        if claim.attempts >= self.retry_budget {
            return true;
        }
        match reason {
            VerdictReason::NoMatchingTransfer => {
                claim.no_match_attempts >= self.no_match_retry_budget
            }
            VerdictReason::NotFound => claim
                .created_at
                .has_expired(self.not_found_horizon_secs, now),
            _ => false,
        }
    }

    /// Wait after the `attempts`-th attempt: `cooldown * 2^(attempts-1)`,
    /// capped at the maximum.
    pub fn cooldown_for(&self, attempts: u32) -> u64 {
        if attempts == 0 {
            return 0;
        }
        let factor = 1u64.checked_shl(attempts - 1).unwrap_or(u64::MAX);
        self.cooldown_secs
            .saturating_mul(factor)
            .min(self.max_cooldown_secs)
    }

    /// Whether the sweep may attempt the claim at `now`.
    ///
    /// A `Verifying` claim is only due once the same cooldown has passed
    /// since its attempt started, so a live attempt elsewhere is left alone.
    pub fn is_due(&self, claim: &DepositClaim, now: Timestamp) -> bool {
        match claim.last_checked_at {
            None => true,
            Some(checked) => {
                let wait = self.cooldown_for(claim.attempts.max(1));
                checked.has_expired(wait, now)
            }
        }
    }
}
