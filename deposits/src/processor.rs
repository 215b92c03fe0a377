//! Claim submission, verification attempts, crediting, sweep and
//! reconciliation.
//!
//! Every attempt runs under the claim's lock and every write is a
//! compare-and-set on the status read under that lock, so a claim is
//! credited at most once even when a request, the sweep and another process
//! race on it. The ledger's idempotency by claim id is the last line.

use std::sync::{Arc, Mutex, PoisonError};

use rust_decimal::Decimal;
use tally_chain::ChainClient;
use tally_store::{Balance, ClaimStore, DepositClaim, LedgerStore, NewClaim, StoreError};
use tally_types::{ChainAddress, ClaimId, ClaimStatus, Clock, Timestamp, TxHash, UserId};

use crate::state_machine::{self, VerdictOutcome};
use crate::{
    ClaimLocks, DepositConfig, DepositError, DepositVerifier, RetryPolicy, VerificationRequest,
    VerificationVerdict,
};

/// Statuses the sweep picks claims from.
const SWEEPABLE: [ClaimStatus; 3] = [
    ClaimStatus::Pending,
    ClaimStatus::Verifying,
    ClaimStatus::Verified,
];

/// Pages of `batch_size` claims one sweep pass reads at most.
const SWEEP_SCAN_PAGES: usize = 4;

/// A user's "I sent N tokens in transaction H" request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClaimSubmission {
    pub user_id: UserId,
    pub tx_hash: TxHash,
    pub claimed_amount: Decimal,
    /// Defaults to the configured deposit address.
    pub expected_recipient: Option<ChainAddress>,
}

/// What one attempt on a claim did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Attempt {
    /// Already credited, rejected or failed; nothing was done.
    Settled(DepositClaim),
    /// Another worker moved the claim first.
    Busy(DepositClaim),
    /// The claim was checked against the chain.
    Checked {
        claim: DepositClaim,
        verdict: VerificationVerdict,
    },
    /// A verified claim was credited without a new chain lookup.
    Reconciled(DepositClaim),
}

impl Attempt {
    pub fn claim(&self) -> &DepositClaim {
        match self {
            Self::Settled(claim) | Self::Busy(claim) | Self::Reconciled(claim) => claim,
            Self::Checked { claim, .. } => claim,
        }
    }

    pub fn verdict(&self) -> Option<&VerificationVerdict> {
        match self {
            Self::Checked { verdict, .. } => Some(verdict),
            _ => None,
        }
    }

    /// Whether this attempt moved the claim to `Credited`.
    pub fn credited(&self) -> bool {
        matches!(self, Self::Checked { .. } | Self::Reconciled(_))
            && self.claim().status == ClaimStatus::Credited
    }
}

/// Tally of one sweep or reconciliation pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Claims whose backoff had elapsed.
    pub due: usize,
    pub attempted: usize,
    pub credited: usize,
    pub retried: usize,
    pub rejected: usize,
    pub failed: usize,
    /// Claims held or moved by another worker.
    pub skipped: usize,
    pub errors: usize,
}

impl SweepReport {
    fn record(&mut self, attempt: &Attempt) {
        if let Attempt::Busy(_) = attempt {
            self.skipped += 1;
            return;
        }
        match attempt.claim().status {
            ClaimStatus::Credited if attempt.credited() => self.credited += 1,
            ClaimStatus::Pending => self.retried += 1,
            ClaimStatus::Rejected => self.rejected += 1,
            ClaimStatus::Failed => self.failed += 1,
            _ => {}
        }
    }

    fn record_error(&mut self, claim_id: ClaimId, error: &DepositError) {
        match error {
            e if e.is_conflict() => self.skipped += 1,
            DepositError::LedgerMismatch { .. } => self.failed += 1,
            e => {
                self.errors += 1;
                tracing::warn!(claim_id = %claim_id, error = %e, "claim attempt failed");
            }
        }
    }
}

pub struct DepositProcessor {
    claims: Arc<dyn ClaimStore>,
    ledger: Arc<dyn LedgerStore>,
    verifier: DepositVerifier,
    clock: Arc<dyn Clock>,
    locks: ClaimLocks,
    policy: RetryPolicy,
    deposit_address: ChainAddress,
    required_confirmations: u64,
    batch_size: usize,
    /// Last claim id the previous sweep pass looked at.
    sweep_cursor: Mutex<Option<ClaimId>>,
}

impl DepositProcessor {
    pub fn new(
        config: &DepositConfig,
        chain: Arc<dyn ChainClient>,
        claims: Arc<dyn ClaimStore>,
        ledger: Arc<dyn LedgerStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            claims,
            ledger,
            verifier: DepositVerifier::new(chain, config),
            clock,
            locks: ClaimLocks::new(),
            policy: config.retry_policy(),
            deposit_address: config.deposit_address,
            required_confirmations: config.required_confirmations,
            batch_size: config.sweep_batch_size,
            sweep_cursor: Mutex::new(None),
        }
    }

    pub fn deposit_address(&self) -> ChainAddress {
        self.deposit_address
    }

    pub fn required_confirmations(&self) -> u64 {
        self.required_confirmations
    }

    /// Record a new claim.
    ///
    /// A claim on a transaction another claim already owns is stored as
    /// `Rejected` with `DuplicateTxHash` and never looked up on chain.
    pub fn submit_claim(&self, submission: ClaimSubmission) -> Result<DepositClaim, DepositError> {
        if submission.claimed_amount <= Decimal::ZERO {
            return Err(DepositError::InvalidAmount(format!(
                "{} is not positive",
                submission.claimed_amount
            )));
        }
        if let Some(recipient) = submission.expected_recipient {
            if recipient != self.deposit_address {
                return Err(DepositError::UnexpectedRecipient {
                    expected: self.deposit_address,
                    actual: recipient,
                });
            }
        }

        let claim = self.claims.insert_claim(NewClaim {
            user_id: submission.user_id,
            tx_hash: submission.tx_hash,
            claimed_amount: submission.claimed_amount,
            expected_recipient: self.deposit_address,
            created_at: self.clock.now(),
        })?;

        if claim.status == ClaimStatus::Rejected {
            tracing::info!(
                claim_id = %claim.id,
                user_id = %claim.user_id,
                tx_hash = %claim.tx_hash,
                "duplicate deposit claim rejected"
            );
        } else {
            tracing::info!(
                claim_id = %claim.id,
                user_id = %claim.user_id,
                tx_hash = %claim.tx_hash,
                amount = %claim.claimed_amount,
                "deposit claim submitted"
            );
        }
        Ok(claim)
    }

    pub fn claim(&self, id: ClaimId) -> Result<DepositClaim, DepositError> {
        self.claims
            .get_claim(id)?
            .ok_or(DepositError::ClaimNotFound(id))
    }

    pub fn balance(&self, user_id: &UserId) -> Result<Balance, DepositError> {
        Ok(self.ledger.balance(user_id)?)
    }

    /// Claims not yet settled: pending, mid-attempt or awaiting credit.
    pub fn open_claims(&self) -> Result<usize, DepositError> {
        let open = self.claims.count_with_status(&SWEEPABLE)?;
        Ok(usize::try_from(open).unwrap_or(usize::MAX))
    }

    /// Verdict for an arbitrary transaction, without touching any claim.
    pub async fn check_transaction(
        &self,
        tx_hash: TxHash,
        claimed_amount: Decimal,
    ) -> VerificationVerdict {
        let request = VerificationRequest {
            tx_hash,
            expected_recipient: self.deposit_address,
            claimed_amount,
            required_confirmations: self.required_confirmations,
        };
        self.verifier.verify(&request).await
    }

    /// Synchronous "check my deposit": one attempt now, ignoring backoff.
    ///
    /// Waits for any attempt already running on the claim, then works from
    /// the state that attempt left behind. A check made before the claim's
    /// backoff has run out does not spend its retry budget.
    #[tracing::instrument(skip(self), fields(claim_id = %id))]
    pub async fn verify_claim(&self, id: ClaimId) -> Result<Attempt, DepositError> {
        let tx_hash = self.claim(id)?.tx_hash;
        let _guard = self.locks.lock(&tx_hash).await;
        let claim = self.claim(id)?;
        self.attempt_locked(claim).await
    }

    /// One pass over claims whose backoff has elapsed, up to the batch size.
    ///
    /// Claims are read a page at a time from where the previous pass
    /// stopped, wrapping around at the end, so a pass reads a bounded number
    /// of claims however large the backlog. Claims locked by a running
    /// attempt are skipped. Per-claim failures are counted in the report and
    /// do not stop the pass.
    pub async fn sweep(&self) -> Result<SweepReport, DepositError> {
        let now = self.clock.now();
        let mut cursor = *self
            .sweep_cursor
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let mut report = SweepReport::default();
        'pass: for _ in 0..SWEEP_SCAN_PAGES {
            let page = self
                .claims
                .claims_with_status(&SWEEPABLE, cursor, self.batch_size)?;
            let last_page = page.len() < self.batch_size;
            for candidate in page {
                if report.attempted >= self.batch_size {
                    break 'pass;
                }
                cursor = Some(candidate.id);
                self.sweep_one(candidate, now, &mut report).await;
            }
            if last_page {
                cursor = None;
                break;
            }
            if report.attempted >= self.batch_size {
                break;
            }
        }
        *self
            .sweep_cursor
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = cursor;

        if report.attempted > 0 {
            tracing::info!(
                attempted = report.attempted,
                credited = report.credited,
                retried = report.retried,
                rejected = report.rejected,
                failed = report.failed,
                errors = report.errors,
                "sweep complete"
            );
        }
        Ok(report)
    }

    async fn sweep_one(&self, candidate: DepositClaim, now: Timestamp, report: &mut SweepReport) {
        if !self.is_due(&candidate, now) {
            return;
        }
        report.due += 1;

        let Some(_guard) = self.locks.try_lock(&candidate.tx_hash) else {
            report.skipped += 1;
            return;
        };
        let claim = match self.claim(candidate.id) {
            Ok(claim) => claim,
            Err(e) => {
                report.record_error(candidate.id, &e);
                return;
            }
        };
        if !claim.status.is_sweepable() || !self.is_due(&claim, now) {
            report.skipped += 1;
            return;
        }

        report.attempted += 1;
        match self.attempt_locked(claim).await {
            Ok(attempt) => report.record(&attempt),
            Err(e) => report.record_error(candidate.id, &e),
        }
    }

    /// Credit every claim left in `Verified`, e.g. after a crash between the
    /// ledger credit and the status write. The ledger is idempotent by claim
    /// id, so a credit that already happened is only acknowledged.
    pub async fn reconcile(&self) -> Result<SweepReport, DepositError> {
        let mut report = SweepReport::default();
        let mut cursor = None;
        loop {
            let page =
                self.claims
                    .claims_with_status(&[ClaimStatus::Verified], cursor, self.batch_size)?;
            let last_page = page.len() < self.batch_size;
            report.due += page.len();

            for candidate in page {
                cursor = Some(candidate.id);
                let _guard = self.locks.lock(&candidate.tx_hash).await;
                let claim = match self.claim(candidate.id) {
                    Ok(claim) => claim,
                    Err(e) => {
                        report.record_error(candidate.id, &e);
                        continue;
                    }
                };
                if claim.status != ClaimStatus::Verified {
                    report.skipped += 1;
                    continue;
                }
                report.attempted += 1;
                match self.credit_locked(claim) {
                    Ok(claim) => report.record(&Attempt::Reconciled(claim)),
                    Err(e) => report.record_error(candidate.id, &e),
                }
            }
            if last_page {
                break;
            }
        }

        tracing::info!(
            verified = report.due,
            credited = report.credited,
            failed = report.failed,
            "reconciliation complete"
        );
        Ok(report)
    }

    fn is_due(&self, claim: &DepositClaim, now: Timestamp) -> bool {
        claim.status == ClaimStatus::Verified || self.policy.is_due(claim, now)
    }

    /// Run one attempt. The caller holds the claim's lock.
    async fn attempt_locked(&self, mut claim: DepositClaim) -> Result<Attempt, DepositError> {
        match claim.status {
            ClaimStatus::Credited | ClaimStatus::Rejected | ClaimStatus::Failed => {
                return Ok(Attempt::Settled(claim));
            }
            ClaimStatus::Verified => return self.credit_locked(claim).map(Attempt::Reconciled),
            ClaimStatus::Pending | ClaimStatus::Verifying => {}
        }

        let now = self.clock.now();
        // Early checks leave the budget and the sweep's schedule alone.
        let counted = self.policy.is_due(&claim, now);
        let scheduled = claim.last_checked_at;
        let prior = state_machine::begin_attempt(&mut claim, now)?;
        match self.claims.update_claim(&claim, prior) {
            Ok(()) => {}
            Err(StoreError::Conflict { .. }) => return Ok(Attempt::Busy(self.claim(claim.id)?)),
            Err(e) => return Err(e.into()),
        }
        if prior == ClaimStatus::Verifying {
            tracing::warn!(claim_id = %claim.id, "taking over stale verification attempt");
        }

        let request = VerificationRequest::for_claim(&claim, self.required_confirmations);
        let verdict = self.verifier.verify(&request).await;
        let outcome = state_machine::apply_verdict(
            &mut claim,
            &verdict,
            &self.policy,
            self.clock.now(),
            counted,
        )?;
        if !counted && matches!(outcome, VerdictOutcome::Retry(_)) {
            claim.last_checked_at = scheduled;
        }
        self.claims.update_claim(&claim, ClaimStatus::Verifying)?;

        match outcome {
            VerdictOutcome::Verified => {
                tracing::info!(
                    claim_id = %claim.id,
                    tx_hash = %claim.tx_hash,
                    confirmations = verdict.confirmations,
                    "deposit verified"
                );
                match self.credit_locked(claim.clone()) {
                    Ok(credited) => claim = credited,
                    Err(DepositError::Store(e))
                        if !e.is_corruption() && !matches!(e, StoreError::Conflict { .. }) =>
                    {
                        tracing::warn!(
                            claim_id = %claim.id,
                            error = %e,
                            "credit deferred to reconciliation"
                        );
                    }
                    Err(e) => return Err(e),
                }
            }
            VerdictOutcome::Retry(reason) => {
                tracing::debug!(
                    claim_id = %claim.id,
                    %reason,
                    attempts = claim.attempts,
                    counted,
                    "deposit not verified yet"
                );
            }
            VerdictOutcome::Rejected(reason) => {
                tracing::info!(
                    claim_id = %claim.id,
                    tx_hash = %claim.tx_hash,
                    %reason,
                    attempts = claim.attempts,
                    "deposit claim rejected"
                );
            }
        }

        Ok(Attempt::Checked { claim, verdict })
    }

    /// Credit a `Verified` claim and mark it `Credited`. The caller holds the
    /// claim's lock.
    ///
    /// The credit is the claimed amount capped at what arrived on chain. If
    /// the ledger call fails the claim stays `Verified` for the next
    /// reconciliation. A ledger entry that disagrees with the claim, or an
    /// unreadable ledger, parks the claim in `Failed`.
    fn credit_locked(&self, mut claim: DepositClaim) -> Result<DepositClaim, DepositError> {
        let amount = claim.credit_amount();
        let outcome = match self.ledger.credit(
            &claim.user_id,
            amount,
            claim.id,
            self.clock.now(),
        ) {
            Ok(outcome) => outcome,
            Err(e) if e.is_corruption() => {
                self.fail(claim, format!("ledger unreadable: {e}"))?;
                return Err(e.into());
            }
            Err(e) => return Err(e.into()),
        };

        let entry = outcome.entry();
        if entry.user_id != claim.user_id || entry.amount != amount {
            let detail = format!(
                "ledger holds {} for {}, claim credits {} for {}",
                entry.amount, entry.user_id, amount, claim.user_id
            );
            let id = claim.id;
            self.fail(claim, detail.clone())?;
            return Err(DepositError::LedgerMismatch { id, detail });
        }

        let applied = outcome.was_applied();
        state_machine::mark_credited(&mut claim, entry.credited_at)?;
        self.claims.update_claim(&claim, ClaimStatus::Verified)?;

        tracing::info!(
            claim_id = %claim.id,
            user_id = %claim.user_id,
            %amount,
            claimed = %claim.claimed_amount,
            applied,
            "deposit credited"
        );
        Ok(claim)
    }

    fn fail(&self, mut claim: DepositClaim, detail: String) -> Result<(), DepositError> {
        let prior = claim.status;
        tracing::error!(claim_id = %claim.id, %detail, "claim needs operator attention");
        state_machine::mark_failed(&mut claim, detail)?;
        self.claims.update_claim(&claim, prior)?;
        Ok(())
    }
}
