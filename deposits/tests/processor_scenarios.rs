use std::str::FromStr;
use std::sync::Arc;

use alloy_primitives::{Address, U256};
use rust_decimal::Decimal;
use tally_chain::{ChainClient, Log};
use tally_deposits::{Attempt, ClaimSubmission, DepositConfig, DepositError, DepositProcessor};
use tally_nullables::{transfer_log, NullChain, NullClaimStore, NullClock, NullLedger};
use tally_store::{ClaimStore, LedgerEntry, LedgerStore};
use tally_types::{ChainAddress, ClaimId, ClaimStatus, Clock, Timestamp, TxHash, UserId, VerdictReason};

const TOKEN: [u8; 20] = [0x55; 20];
const START: u64 = 1_700_000_000;

fn deposit_address() -> ChainAddress {
    ChainAddress::from_str("0x000000000000000000000000000000000000dEaD").unwrap()
}

fn tx(byte: u8) -> TxHash {
    TxHash::new([byte; 32])
}

fn user(name: &str) -> UserId {
    UserId::new(name).unwrap()
}

fn tokens(whole: u64) -> U256 {
    U256::from(whole) * U256::from(10u64).pow(U256::from(18u64))
}

fn payment(to: ChainAddress, whole: u64) -> Log {
    transfer_log(
        Address::from(TOKEN),
        Address::repeat_byte(0x01),
        Address::from(*to.as_bytes()),
        tokens(whole),
    )
}

struct Harness {
    chain: Arc<NullChain>,
    claims: Arc<NullClaimStore>,
    ledger: Arc<NullLedger>,
    clock: Arc<NullClock>,
    processor: Arc<DepositProcessor>,
}

impl Harness {
    fn new() -> Self {
        Self::with_config(|_| {})
    }

    fn with_config(tweak: impl FnOnce(&mut DepositConfig)) -> Self {
        let mut config = DepositConfig {
            token_contract: ChainAddress::new(TOKEN),
            deposit_address: deposit_address(),
            ..Default::default()
        };
        tweak(&mut config);
        config.validate().unwrap();

        let chain = Arc::new(NullChain::new(1012));
        let claims = Arc::new(NullClaimStore::new());
        let ledger = Arc::new(NullLedger::new());
        let clock = Arc::new(NullClock::new(START));
        let processor = Arc::new(DepositProcessor::new(
            &config,
            Arc::clone(&chain) as Arc<dyn ChainClient>,
            Arc::clone(&claims) as Arc<dyn ClaimStore>,
            Arc::clone(&ledger) as Arc<dyn LedgerStore>,
            Arc::clone(&clock) as Arc<dyn Clock>,
        ));
        Self {
            chain,
            claims,
            ledger,
            clock,
            processor,
        }
    }

    fn submit(&self, who: &str, hash: TxHash, amount: u64) -> ClaimId {
        self.processor
            .submit_claim(ClaimSubmission {
                user_id: user(who),
                tx_hash: hash,
                claimed_amount: Decimal::from(amount),
                expected_recipient: None,
            })
            .unwrap()
            .id
    }

    fn status(&self, id: ClaimId) -> ClaimStatus {
        self.processor.claim(id).unwrap().status
    }
}

#[tokio::test]
async fn confirmed_deposit_is_credited_once() {
    let h = Harness::new();
    h.chain.mine(tx(0xab), 1000, vec![payment(deposit_address(), 100)]);
    let id = h.submit("alice", tx(0xab), 100);

    let attempt = h.processor.verify_claim(id).await.unwrap();
    let verdict = attempt.verdict().unwrap();
    assert!(verdict.verified);
    assert_eq!(verdict.confirmations, 12);
    assert_eq!(verdict.amount_on_chain, Some(Decimal::from(100)));
    assert!(attempt.credited());
    assert_eq!(h.status(id), ClaimStatus::Credited);

    let again = h.processor.verify_claim(id).await.unwrap();
    assert!(matches!(again, Attempt::Settled(_)));
    assert_eq!(h.ledger.credit_calls(), 1);
    assert_eq!(h.chain.receipt_calls(), 1);

    let balance = h.processor.balance(&user("alice")).unwrap();
    assert_eq!(balance.balance, Decimal::from(100));
    assert_eq!(balance.total_earned, Decimal::from(100));
}

#[tokio::test]
async fn shallow_deposit_stays_pending_until_deep_enough() {
    let h = Harness::new();
    h.chain.set_height(1005);
    h.chain.mine(tx(0xab), 1000, vec![payment(deposit_address(), 100)]);
    let id = h.submit("alice", tx(0xab), 100);

    let attempt = h.processor.verify_claim(id).await.unwrap();
    let verdict = attempt.verdict().unwrap();
    assert!(!verdict.verified);
    assert_eq!(verdict.confirmations, 5);
    assert_eq!(verdict.reason, Some(VerdictReason::InsufficientConfirmations));

    let claim = h.processor.claim(id).unwrap();
    assert_eq!(claim.status, ClaimStatus::Pending);
    assert_eq!(claim.last_reason, Some(VerdictReason::InsufficientConfirmations));
    assert_eq!(h.ledger.credit_calls(), 0);

    h.chain.advance_height(7);
    h.processor.verify_claim(id).await.unwrap();
    assert_eq!(h.status(id), ClaimStatus::Credited);
}

#[tokio::test]
async fn repeated_checks_inside_backoff_never_reject_a_shallow_deposit() {
    let h = Harness::new();
    h.chain.set_height(1005);
    h.chain.mine(tx(0xab), 1000, vec![payment(deposit_address(), 100)]);
    let id = h.submit("alice", tx(0xab), 100);

    for _ in 0..40 {
        h.processor.verify_claim(id).await.unwrap();
    }
    let claim = h.processor.claim(id).unwrap();
    assert_eq!(claim.status, ClaimStatus::Pending);
    assert_eq!(claim.attempts, 1);
    assert_eq!(claim.last_checked_at, Some(Timestamp::new(START)));
    assert_eq!(h.chain.receipt_calls(), 40);

    h.chain.advance_height(100);
    let attempt = h.processor.verify_claim(id).await.unwrap();
    assert!(attempt.credited());
    assert_eq!(
        h.processor.balance(&user("alice")).unwrap().balance,
        Decimal::from(100)
    );
}

#[tokio::test]
async fn credit_is_capped_at_amount_received() {
    let h = Harness::new();
    let received = U256::from(99_999_999_500_000_000_000u128);
    h.chain.mine(
        tx(0xab),
        1000,
        vec![transfer_log(
            Address::from(TOKEN),
            Address::repeat_byte(0x01),
            Address::from(*deposit_address().as_bytes()),
            received,
        )],
    );
    let id = h.submit("alice", tx(0xab), 100);

    let attempt = h.processor.verify_claim(id).await.unwrap();
    assert!(attempt.credited());
    let on_chain = Decimal::from_str("99.9999995").unwrap();
    assert_eq!(attempt.claim().amount_on_chain, Some(on_chain));
    assert_eq!(h.processor.balance(&user("alice")).unwrap().balance, on_chain);

    let report = h.processor.reconcile().await.unwrap();
    assert_eq!(report.attempted, 0);
    assert_eq!(h.processor.balance(&user("alice")).unwrap().balance, on_chain);
}

#[tokio::test]
async fn short_payment_is_rejected() {
    let h = Harness::new();
    h.chain.mine(tx(0xab), 1000, vec![payment(deposit_address(), 50)]);
    let id = h.submit("alice", tx(0xab), 100);

    h.processor.verify_claim(id).await.unwrap();
    let claim = h.processor.claim(id).unwrap();
    assert_eq!(claim.status, ClaimStatus::Rejected);
    assert_eq!(claim.rejection_reason, Some(VerdictReason::AmountMismatch));
    assert_eq!(claim.amount_on_chain, Some(Decimal::from(50)));
    assert_eq!(h.ledger.credit_calls(), 0);
}

#[tokio::test]
async fn second_claim_on_same_transaction_never_reaches_chain() {
    let h = Harness::new();
    h.chain.mine(tx(0xab), 1000, vec![payment(deposit_address(), 100)]);
    let first = h.submit("alice", tx(0xab), 100);
    h.processor.verify_claim(first).await.unwrap();

    let second = h.submit("mallory", tx(0xab), 100);
    let claim = h.processor.claim(second).unwrap();
    assert_eq!(claim.status, ClaimStatus::Rejected);
    assert_eq!(claim.rejection_reason, Some(VerdictReason::DuplicateTxHash));

    let attempt = h.processor.verify_claim(second).await.unwrap();
    assert!(matches!(attempt, Attempt::Settled(_)));
    assert_eq!(h.chain.receipt_calls(), 1);
    assert_eq!(h.ledger.credit_calls(), 1);
    assert_eq!(
        h.processor.balance(&user("mallory")).unwrap().balance,
        Decimal::ZERO
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_checks_credit_exactly_once() {
    let h = Harness::new();
    h.chain.mine(tx(0xab), 1000, vec![payment(deposit_address(), 100)]);
    let id = h.submit("alice", tx(0xab), 100);

    let mut tasks = Vec::new();
    for _ in 0..16 {
        let processor = Arc::clone(&h.processor);
        tasks.push(tokio::spawn(async move { processor.verify_claim(id).await }));
    }
    let sweeper = Arc::clone(&h.processor);
    tasks.push(tokio::spawn(async move {
        sweeper.sweep().await.map(|_| Attempt::Settled(sweeper.claim(id).unwrap()))
    }));
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert_eq!(h.status(id), ClaimStatus::Credited);
    assert_eq!(h.ledger.credit_calls(), 1);
    assert_eq!(h.ledger.applied_count(), 1);
    assert_eq!(
        h.processor.balance(&user("alice")).unwrap().balance,
        Decimal::from(100)
    );
}

#[tokio::test]
async fn retry_budget_exhaustion_rejects_with_last_reason() {
    let h = Harness::with_config(|c| c.retry_budget = 3);
    h.chain.set_offline(true);
    let id = h.submit("alice", tx(0xab), 100);

    for expected_attempts in 1..=2 {
        h.processor.verify_claim(id).await.unwrap();
        let claim = h.processor.claim(id).unwrap();
        assert_eq!(claim.status, ClaimStatus::Pending);
        assert_eq!(claim.attempts, expected_attempts);
        assert_eq!(claim.last_reason, Some(VerdictReason::RpcUnavailable));
        h.clock.advance(1800);
    }

    h.processor.verify_claim(id).await.unwrap();
    let claim = h.processor.claim(id).unwrap();
    assert_eq!(claim.status, ClaimStatus::Rejected);
    assert_eq!(claim.rejection_reason, Some(VerdictReason::RpcUnavailable));
}

#[tokio::test]
async fn never_mined_transaction_expires_after_horizon() {
    let h = Harness::with_config(|c| c.not_found_horizon_secs = 3600);
    let id = h.submit("alice", tx(0xab), 100);

    h.processor.verify_claim(id).await.unwrap();
    assert_eq!(h.status(id), ClaimStatus::Pending);

    h.clock.advance(3600);
    h.processor.verify_claim(id).await.unwrap();
    let claim = h.processor.claim(id).unwrap();
    assert_eq!(claim.status, ClaimStatus::Rejected);
    assert_eq!(claim.rejection_reason, Some(VerdictReason::NotFound));
}

#[tokio::test]
async fn crash_after_credit_is_reconciled_without_second_credit() {
    let h = Harness::new();
    h.chain.mine(tx(0xab), 1000, vec![payment(deposit_address(), 100)]);
    let id = h.submit("alice", tx(0xab), 100);

    h.claims.fail_next_write_to(ClaimStatus::Credited);
    let attempt = h.processor.verify_claim(id).await.unwrap();
    assert_eq!(attempt.claim().status, ClaimStatus::Verified);
    assert_eq!(h.status(id), ClaimStatus::Verified);
    assert_eq!(h.ledger.applied_count(), 1);

    let report = h.processor.reconcile().await.unwrap();
    assert_eq!(report.credited, 1);
    assert_eq!(h.status(id), ClaimStatus::Credited);
    assert_eq!(h.ledger.applied_count(), 1);
    assert_eq!(h.ledger.credit_calls(), 2);
    assert_eq!(
        h.processor.balance(&user("alice")).unwrap().balance,
        Decimal::from(100)
    );
}

#[tokio::test]
async fn ledger_outage_leaves_claim_verified_for_the_sweep() {
    let h = Harness::new();
    h.chain.mine(tx(0xab), 1000, vec![payment(deposit_address(), 100)]);
    let id = h.submit("alice", tx(0xab), 100);

    h.ledger.fail_next_credit();
    h.processor.verify_claim(id).await.unwrap();
    assert_eq!(h.status(id), ClaimStatus::Verified);
    assert_eq!(h.ledger.applied_count(), 0);

    let report = h.processor.sweep().await.unwrap();
    assert_eq!(report.credited, 1);
    assert_eq!(h.status(id), ClaimStatus::Credited);
    assert_eq!(h.chain.receipt_calls(), 1);
}

#[tokio::test]
async fn disagreeing_ledger_entry_fails_the_claim() {
    let h = Harness::new();
    h.chain.mine(tx(0xab), 1000, vec![payment(deposit_address(), 100)]);
    let id = h.submit("alice", tx(0xab), 100);
    h.ledger.force_entry(LedgerEntry {
        claim_id: id,
        user_id: user("bob"),
        amount: Decimal::from(7),
        credited_at: Timestamp::new(1),
    });

    let err = h.processor.verify_claim(id).await.unwrap_err();
    assert!(matches!(err, DepositError::LedgerMismatch { .. }));
    let claim = h.processor.claim(id).unwrap();
    assert_eq!(claim.status, ClaimStatus::Failed);
    assert!(claim.failure.is_some());
}

#[tokio::test]
async fn sweep_honours_backoff() {
    let h = Harness::new();
    let id = h.submit("alice", tx(0xab), 100);

    let report = h.processor.sweep().await.unwrap();
    assert_eq!(report.attempted, 1);
    assert_eq!(report.retried, 1);

    let report = h.processor.sweep().await.unwrap();
    assert_eq!(report.attempted, 0);

    h.clock.advance(30);
    h.chain.mine(tx(0xab), 1000, vec![payment(deposit_address(), 100)]);
    let report = h.processor.sweep().await.unwrap();
    assert_eq!(report.attempted, 1);
    assert_eq!(report.credited, 1);
    assert_eq!(h.status(id), ClaimStatus::Credited);
}

#[tokio::test]
async fn sweep_takes_over_stale_attempt() {
    let h = Harness::new();
    h.chain.mine(tx(0xab), 1000, vec![payment(deposit_address(), 100)]);
    let id = h.submit("alice", tx(0xab), 100);

    let mut stale = h.claims.get_claim(id).unwrap().unwrap();
    stale.status = ClaimStatus::Verifying;
    stale.last_checked_at = Some(Timestamp::new(START));
    h.claims.force(stale);

    assert_eq!(h.processor.sweep().await.unwrap().attempted, 0);

    h.clock.advance(30);
    let report = h.processor.sweep().await.unwrap();
    assert_eq!(report.credited, 1);
    assert_eq!(h.status(id), ClaimStatus::Credited);
}

#[tokio::test]
async fn sweep_stops_at_batch_size() {
    let h = Harness::with_config(|c| c.sweep_batch_size = 2);
    for byte in 1..=5 {
        h.submit("alice", tx(byte), 1);
    }
    let report = h.processor.sweep().await.unwrap();
    assert_eq!(report.attempted, 2);
    assert_eq!(h.processor.open_claims().unwrap(), 5);
}

#[tokio::test]
async fn sweep_resumes_where_previous_pass_stopped() {
    let h = Harness::with_config(|c| c.sweep_batch_size = 2);
    let ids: Vec<ClaimId> = (1..=5).map(|byte| h.submit("alice", tx(byte), 1)).collect();
    let attempts = |h: &Harness| -> Vec<u32> {
        ids.iter()
            .map(|id| h.processor.claim(*id).unwrap().attempts)
            .collect()
    };

    assert_eq!(h.processor.sweep().await.unwrap().attempted, 2);
    assert_eq!(attempts(&h), vec![1, 1, 0, 0, 0]);

    assert_eq!(h.processor.sweep().await.unwrap().attempted, 2);
    assert_eq!(attempts(&h), vec![1, 1, 1, 1, 0]);

    assert_eq!(h.processor.sweep().await.unwrap().attempted, 1);
    assert_eq!(attempts(&h), vec![1, 1, 1, 1, 1]);

    assert_eq!(h.processor.sweep().await.unwrap().attempted, 0);

    h.clock.advance(30);
    assert_eq!(h.processor.sweep().await.unwrap().attempted, 2);
    assert_eq!(attempts(&h), vec![2, 2, 1, 1, 1]);
}

#[tokio::test]
async fn invalid_submissions_are_refused() {
    let h = Harness::new();
    let zero = h.processor.submit_claim(ClaimSubmission {
        user_id: user("alice"),
        tx_hash: tx(1),
        claimed_amount: Decimal::ZERO,
        expected_recipient: None,
    });
    assert!(matches!(zero, Err(DepositError::InvalidAmount(_))));

    let elsewhere = h.processor.submit_claim(ClaimSubmission {
        user_id: user("alice"),
        tx_hash: tx(1),
        claimed_amount: Decimal::ONE,
        expected_recipient: Some(ChainAddress::new([0x42; 20])),
    });
    assert!(matches!(
        elsewhere,
        Err(DepositError::UnexpectedRecipient { .. })
    ));
    assert_eq!(h.claims.claim_count().unwrap(), 0);
}

#[tokio::test]
async fn unknown_claim_is_not_found() {
    let h = Harness::new();
    assert!(matches!(
        h.processor.verify_claim(ClaimId::new(404)).await,
        Err(DepositError::ClaimNotFound(_))
    ));
}

#[tokio::test]
async fn read_only_check_touches_no_claim() {
    let h = Harness::new();
    h.chain.mine(tx(0xab), 1000, vec![payment(deposit_address(), 100)]);
    let verdict = h
        .processor
        .check_transaction(tx(0xab), Decimal::from(100))
        .await;
    assert!(verdict.verified);
    assert_eq!(h.claims.claim_count().unwrap(), 0);
    assert_eq!(h.ledger.credit_calls(), 0);
}
