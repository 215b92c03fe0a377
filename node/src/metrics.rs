//! Prometheus metrics for the deposit engine.
//!
//! [`DepositMetrics`] owns a dedicated [`Registry`] that the API's
//! `/metrics` endpoint encodes into the Prometheus text exposition format.
//! It is fed by the API (through [`DepositObserver`]) and by the sweeper.

use std::time::Duration;

use prometheus::{
    register_histogram_with_registry, register_int_counter_with_registry,
    register_int_gauge_with_registry, Histogram, HistogramOpts, IntCounter, IntGauge, Opts,
    Registry,
};
use tally_deposits::{Attempt, SweepReport};
use tally_rpc::DepositObserver;
use tally_store::DepositClaim;
use tally_types::{ClaimStatus, VerdictReason};

pub struct DepositMetrics {
    pub registry: Registry,

    // ── Counters ────────────────────────────────────────────────────────
    pub claims_submitted: IntCounter,
    /// Submissions stored as `Rejected` because the tx hash was taken.
    pub duplicates: IntCounter,
    pub claims_credited: IntCounter,
    pub claims_rejected: IntCounter,
    pub claims_failed: IntCounter,
    /// Attempts that reached the chain or the ledger.
    pub verification_attempts: IntCounter,
    /// Attempts whose verdict was `RpcUnavailable`.
    pub rpc_failures: IntCounter,
    /// Attempts that ended in a storage or locking error.
    pub attempt_errors: IntCounter,
    pub sweeps: IntCounter,

    // ── Gauges ──────────────────────────────────────────────────────────
    /// Claims in `Pending`, `Verifying` or `Verified`.
    pub claims_pending: IntGauge,

    // ── Histograms ──────────────────────────────────────────────────────
    /// Wall time of a synchronous verification, in milliseconds.
    pub verification_latency_ms: Histogram,
    pub sweep_duration_ms: Histogram,
}

impl DepositMetrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let counter = |name: &str, help: &str| {
            register_int_counter_with_registry!(Opts::new(name, help), registry)
                .expect("failed to register counter")
        };

        let claims_submitted = counter("tally_claims_submitted_total", "Claims submitted");
        let duplicates = counter(
            "tally_claims_duplicate_total",
            "Claims rejected because the transaction was already claimed",
        );
        let claims_credited = counter("tally_claims_credited_total", "Claims credited");
        let claims_rejected = counter(
            "tally_claims_rejected_total",
            "Claims rejected after verification",
        );
        let claims_failed = counter(
            "tally_claims_failed_total",
            "Claims moved to Failed for operator action",
        );
        let verification_attempts = counter(
            "tally_verification_attempts_total",
            "Verification attempts run",
        );
        let rpc_failures = counter(
            "tally_rpc_failures_total",
            "Verification attempts that could not reach the chain node",
        );
        let attempt_errors = counter(
            "tally_attempt_errors_total",
            "Verification attempts that ended in a storage error",
        );
        let sweeps = counter("tally_sweeps_total", "Background sweep passes");

        let claims_pending = register_int_gauge_with_registry!(
            Opts::new("tally_claims_pending", "Claims not yet settled"),
            registry
        )
        .expect("failed to register claims_pending gauge");

        // 1 ms to ~16 s.
        let verification_latency_ms = register_histogram_with_registry!(
            HistogramOpts::new(
                "tally_verification_latency_ms",
                "Synchronous verification latency in milliseconds"
            )
            .buckets(
                prometheus::exponential_buckets(1.0, 2.0, 15).expect("static bucket layout")
            ),
            registry
        )
        .expect("failed to register verification_latency_ms histogram");

        let sweep_duration_ms = register_histogram_with_registry!(
            HistogramOpts::new("tally_sweep_duration_ms", "Sweep pass duration in milliseconds")
                .buckets(
                    prometheus::exponential_buckets(1.0, 2.0, 18).expect("static bucket layout")
                ),
            registry
        )
        .expect("failed to register sweep_duration_ms histogram");

        Self {
            registry,
            claims_submitted,
            duplicates,
            claims_credited,
            claims_rejected,
            claims_failed,
            verification_attempts,
            rpc_failures,
            attempt_errors,
            sweeps,
            claims_pending,
            verification_latency_ms,
            sweep_duration_ms,
        }
    }

    /// Count the outcome of one attempt.
    pub fn record_attempt(&self, attempt: &Attempt) {
        match attempt {
            Attempt::Checked { claim, verdict } => {
                self.verification_attempts.inc();
                if verdict.reason == Some(VerdictReason::RpcUnavailable) {
                    self.rpc_failures.inc();
                }
                self.record_status(claim.status);
            }
            Attempt::Reconciled(claim) => {
                self.verification_attempts.inc();
                self.record_status(claim.status);
            }
            Attempt::Settled(_) | Attempt::Busy(_) => {}
        }
    }

    pub fn record_sweep(&self, report: &SweepReport, elapsed: Duration) {
        self.sweeps.inc();
        self.verification_attempts.inc_by(report.attempted as u64);
        self.claims_credited.inc_by(report.credited as u64);
        self.claims_rejected.inc_by(report.rejected as u64);
        self.claims_failed.inc_by(report.failed as u64);
        self.attempt_errors.inc_by(report.errors as u64);
        self.sweep_duration_ms.observe(elapsed.as_secs_f64() * 1000.0);
    }

    pub fn set_pending(&self, open_claims: usize) {
        self.claims_pending
            .set(i64::try_from(open_claims).unwrap_or(i64::MAX));
    }

    fn record_status(&self, status: ClaimStatus) {
        match status {
            ClaimStatus::Credited => self.claims_credited.inc(),
            ClaimStatus::Rejected => self.claims_rejected.inc(),
            ClaimStatus::Failed => self.claims_failed.inc(),
            _ => {}
        }
    }
}

impl Default for DepositMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl DepositObserver for DepositMetrics {
    fn claim_submitted(&self, claim: &DepositClaim) {
        self.claims_submitted.inc();
        if claim.rejection_reason == Some(VerdictReason::DuplicateTxHash) {
            self.duplicates.inc();
        } else {
            self.claims_pending.inc();
        }
    }

    fn attempt_finished(&self, attempt: &Attempt, elapsed: Duration) {
        self.record_attempt(attempt);
        self.verification_latency_ms
            .observe(elapsed.as_secs_f64() * 1000.0);
        let moved = matches!(attempt, Attempt::Checked { .. } | Attempt::Reconciled(_));
        if moved && !attempt.claim().status.is_sweepable() {
            self.claims_pending.dec();
        }
    }

    fn attempt_errored(&self) {
        self.attempt_errors.inc();
    }
}
