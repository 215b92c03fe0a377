use std::str::FromStr;

use rust_decimal::Decimal;
use tally_store::{ClaimStore, CreditOutcome, LedgerStore, NewClaim, StoreError};
use tally_store_lmdb::{check_integrity, LmdbEnvironment};
use tally_types::{ChainAddress, ClaimId, ClaimStatus, Timestamp, TxHash, UserId, VerdictReason};

fn open(dir: &tempfile::TempDir) -> LmdbEnvironment {
    LmdbEnvironment::open(dir.path(), 10 * 1024 * 1024).unwrap()
}

fn user(name: &str) -> UserId {
    UserId::new(name).unwrap()
}

fn new_claim(user_id: &str, tx_byte: u8, amount: &str) -> NewClaim {
    NewClaim {
        user_id: user(user_id),
        tx_hash: TxHash::new([tx_byte; 32]),
        claimed_amount: Decimal::from_str(amount).unwrap(),
        expected_recipient: ChainAddress::new([0x11; 20]),
        created_at: Timestamp::new(1_000),
    }
}

#[test]
fn insert_assigns_sequential_ids() {
    let dir = tempfile::tempdir().unwrap();
    let env = open(&dir);
    let store = env.claim_store();

    let a = store.insert_claim(new_claim("alice", 1, "10")).unwrap();
    let b = store.insert_claim(new_claim("bob", 2, "20")).unwrap();

    assert_eq!(a.id, ClaimId::new(1));
    assert_eq!(b.id, ClaimId::new(2));
    assert_eq!(a.status, ClaimStatus::Pending);
    assert_eq!(store.claim_count().unwrap(), 2);
    assert_eq!(store.get_claim(b.id).unwrap().unwrap(), b);
}

#[test]
fn duplicate_tx_hash_is_recorded_as_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let env = open(&dir);
    let store = env.claim_store();

    let first = store.insert_claim(new_claim("alice", 7, "10")).unwrap();
    let second = store.insert_claim(new_claim("mallory", 7, "10")).unwrap();

    assert_eq!(second.status, ClaimStatus::Rejected);
    assert_eq!(second.rejection_reason, Some(VerdictReason::DuplicateTxHash));
    let owner = store.claim_by_tx_hash(&TxHash::new([7; 32])).unwrap().unwrap();
    assert_eq!(owner.id, first.id);
    assert_eq!(store.claims_for_user(&user("mallory")).unwrap().len(), 1);
}

#[test]
fn update_is_compare_and_set() {
    let dir = tempfile::tempdir().unwrap();
    let env = open(&dir);
    let store = env.claim_store();

    let mut claim = store.insert_claim(new_claim("alice", 3, "5")).unwrap();
    claim.status = ClaimStatus::Verifying;
    store.update_claim(&claim, ClaimStatus::Pending).unwrap();

    let mut stale = claim.clone();
    stale.status = ClaimStatus::Verifying;
    let err = store.update_claim(&stale, ClaimStatus::Pending).unwrap_err();
    assert!(matches!(
        err,
        StoreError::Conflict {
            actual: ClaimStatus::Verifying,
            ..
        }
    ));
}

#[test]
fn update_of_unknown_claim_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let env = open(&dir);
    let store = env.claim_store();

    let mut claim = store.insert_claim(new_claim("alice", 3, "5")).unwrap();
    claim.id = ClaimId::new(99);
    assert!(matches!(
        store.update_claim(&claim, ClaimStatus::Pending),
        Err(StoreError::NotFound(_))
    ));
}

#[test]
fn status_listing_follows_transitions_in_creation_order() {
    let dir = tempfile::tempdir().unwrap();
    let env = open(&dir);
    let store = env.claim_store();

    let a = store.insert_claim(new_claim("alice", 1, "1")).unwrap();
    let b = store.insert_claim(new_claim("alice", 2, "2")).unwrap();
    let mut c = store.insert_claim(new_claim("alice", 3, "3")).unwrap();

    c.status = ClaimStatus::Verifying;
    store.update_claim(&c, ClaimStatus::Pending).unwrap();

    let pending = store
        .claims_with_status(&[ClaimStatus::Pending], None, 10)
        .unwrap();
    assert_eq!(
        pending.iter().map(|c| c.id).collect::<Vec<_>>(),
        vec![a.id, b.id]
    );

    let sweepable = store
        .claims_with_status(&[ClaimStatus::Verifying, ClaimStatus::Pending], None, 2)
        .unwrap();
    assert_eq!(
        sweepable.iter().map(|c| c.id).collect::<Vec<_>>(),
        vec![a.id, b.id]
    );

    let next_page = store
        .claims_with_status(&[ClaimStatus::Verifying, ClaimStatus::Pending], Some(b.id), 2)
        .unwrap();
    assert_eq!(
        next_page.iter().map(|c| c.id).collect::<Vec<_>>(),
        vec![c.id]
    );
    assert_eq!(
        store
            .count_with_status(&[ClaimStatus::Pending, ClaimStatus::Verifying])
            .unwrap(),
        3
    );
    assert_eq!(store.count_with_status(&[ClaimStatus::Credited]).unwrap(), 0);
}

#[test]
fn credit_is_idempotent_per_claim() {
    let dir = tempfile::tempdir().unwrap();
    let env = open(&dir);
    let ledger = env.ledger_store();
    let alice = user("alice");
    let amount = Decimal::from_str("100").unwrap();

    let first = ledger
        .credit(&alice, amount, ClaimId::new(1), Timestamp::new(5))
        .unwrap();
    let second = ledger
        .credit(&alice, amount, ClaimId::new(1), Timestamp::new(6))
        .unwrap();

    assert!(first.was_applied());
    assert!(matches!(second, CreditOutcome::AlreadyApplied(_)));
    assert_eq!(second.entry().credited_at, Timestamp::new(5));

    let balance = ledger.balance(&alice).unwrap();
    assert_eq!(balance.balance, amount);
    assert_eq!(balance.total_earned, amount);
    assert_eq!(ledger.balance(&user("bob")).unwrap().balance, Decimal::ZERO);
}

#[test]
fn state_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    {
        let env = open(&dir);
        env.claim_store()
            .insert_claim(new_claim("alice", 1, "1"))
            .unwrap();
        env.ledger_store()
            .credit(
                &user("alice"),
                Decimal::from_str("1.5").unwrap(),
                ClaimId::new(1),
                Timestamp::new(9),
            )
            .unwrap();
    }

    let env = open(&dir);
    let next = env
        .claim_store()
        .insert_claim(new_claim("alice", 2, "2"))
        .unwrap();
    assert_eq!(next.id, ClaimId::new(2));
    assert_eq!(
        env.ledger_store().balance(&user("alice")).unwrap().balance,
        Decimal::from_str("1.5").unwrap()
    );
    assert!(env.ledger_store().credit_for(ClaimId::new(1)).unwrap().is_some());
}

#[test]
fn integrity_flags_verified_claims_and_stray_credits() {
    let dir = tempfile::tempdir().unwrap();
    let env = open(&dir);
    let store = env.claim_store();
    let ledger = env.ledger_store();

    let mut claim = store.insert_claim(new_claim("alice", 1, "1")).unwrap();
    claim.status = ClaimStatus::Verified;
    store.update_claim(&claim, ClaimStatus::Pending).unwrap();

    let report = check_integrity(&env).unwrap();
    assert!(report.is_healthy());
    assert_eq!(report.awaiting_credit, vec![claim.id]);

    ledger
        .credit(&user("bob"), Decimal::ONE, ClaimId::new(42), Timestamp::new(1))
        .unwrap();
    let report = check_integrity(&env).unwrap();
    assert!(!report.is_healthy());
}
