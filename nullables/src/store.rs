//! Nullable stores: thread-safe in-memory claim storage and ledger.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use rust_decimal::Decimal;
use tally_store::{
    Balance, ClaimStore, CreditOutcome, DepositClaim, LedgerEntry, LedgerStore, NewClaim,
    StoreError,
};
use tally_types::{ClaimId, ClaimStatus, Timestamp, TxHash, UserId};

#[derive(Default)]
struct Claims {
    rows: BTreeMap<ClaimId, DepositClaim>,
    tx_index: HashMap<TxHash, ClaimId>,
    next_id: u64,
}

/// An in-memory claim store for testing.
///
/// Thread-safe for use with tokio's multi-threaded runtime. A single write
/// into a chosen status can be made to fail, which simulates a process
/// crash between two persisted steps.
#[derive(Default)]
pub struct NullClaimStore {
    claims: Mutex<Claims>,
    fail_next_write_to: Mutex<Option<ClaimStatus>>,
    writes: AtomicU64,
}

impl NullClaimStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next update that moves a claim into `status` fail.
    pub fn fail_next_write_to(&self, status: ClaimStatus) {
        *self.fail_next_write_to.lock().unwrap() = Some(status);
    }

    /// Number of successful updates.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    /// Overwrite a claim without any checks, for arranging test state.
    pub fn force(&self, claim: DepositClaim) {
        self.claims.lock().unwrap().rows.insert(claim.id, claim);
    }
}

impl ClaimStore for NullClaimStore {
    fn insert_claim(&self, new: NewClaim) -> Result<DepositClaim, StoreError> {
        let mut claims = self.claims.lock().unwrap();
        claims.next_id += 1;
        let id = ClaimId::new(claims.next_id);

        let status = if claims.tx_index.contains_key(&new.tx_hash) {
            ClaimStatus::Rejected
        } else {
            claims.tx_index.insert(new.tx_hash, id);
            ClaimStatus::Pending
        };
        let claim = DepositClaim::from_new(id, new, status);
        claims.rows.insert(id, claim.clone());
        Ok(claim)
    }

    fn get_claim(&self, id: ClaimId) -> Result<Option<DepositClaim>, StoreError> {
        Ok(self.claims.lock().unwrap().rows.get(&id).cloned())
    }

    fn claim_by_tx_hash(&self, tx_hash: &TxHash) -> Result<Option<DepositClaim>, StoreError> {
        let claims = self.claims.lock().unwrap();
        Ok(claims
            .tx_index
            .get(tx_hash)
            .and_then(|id| claims.rows.get(id))
            .cloned())
    }

    fn update_claim(&self, claim: &DepositClaim, expected: ClaimStatus) -> Result<(), StoreError> {
        {
            let mut fail = self.fail_next_write_to.lock().unwrap();
            if *fail == Some(claim.status) {
                *fail = None;
                return Err(StoreError::Backend("injected write failure".to_string()));
            }
        }

        let mut claims = self.claims.lock().unwrap();
        let current = claims
            .rows
            .get_mut(&claim.id)
            .ok_or_else(|| StoreError::NotFound(format!("claim {}", claim.id)))?;
        if current.status != expected {
            return Err(StoreError::Conflict {
                id: claim.id.to_string(),
                expected,
                actual: current.status,
            });
        }
        *current = claim.clone();
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn claims_with_status(
        &self,
        statuses: &[ClaimStatus],
        after: Option<ClaimId>,
        limit: usize,
    ) -> Result<Vec<DepositClaim>, StoreError> {
        Ok(self
            .claims
            .lock()
            .unwrap()
            .rows
            .values()
            .filter(|c| after.map_or(true, |after| c.id > after))
            .filter(|c| statuses.contains(&c.status))
            .take(limit)
            .cloned()
            .collect())
    }

    fn count_with_status(&self, statuses: &[ClaimStatus]) -> Result<u64, StoreError> {
        let claims = self.claims.lock().unwrap();
        Ok(claims
            .rows
            .values()
            .filter(|c| statuses.contains(&c.status))
            .count() as u64)
    }

    fn claims_for_user(&self, user_id: &UserId) -> Result<Vec<DepositClaim>, StoreError> {
        Ok(self
            .claims
            .lock()
            .unwrap()
            .rows
            .values()
            .filter(|c| &c.user_id == user_id)
            .cloned()
            .collect())
    }

    fn claim_count(&self) -> Result<u64, StoreError> {
        Ok(self.claims.lock().unwrap().rows.len() as u64)
    }
}

#[derive(Default)]
struct Accounts {
    entries: HashMap<ClaimId, LedgerEntry>,
    balances: HashMap<UserId, Balance>,
}

/// An in-memory idempotent ledger for testing.
///
/// Counts every credit call separately from credits actually applied.
#[derive(Default)]
pub struct NullLedger {
    accounts: Mutex<Accounts>,
    credit_calls: AtomicU64,
    fail_next_credit: AtomicBool,
}

impl NullLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Calls to [`LedgerStore::credit`], including repeated ones.
    pub fn credit_calls(&self) -> u64 {
        self.credit_calls.load(Ordering::SeqCst)
    }

    /// Credits that actually moved a balance.
    pub fn applied_count(&self) -> usize {
        self.accounts.lock().unwrap().entries.len()
    }

    /// Make the next credit call fail without applying anything.
    pub fn fail_next_credit(&self) {
        self.fail_next_credit.store(true, Ordering::SeqCst);
    }

    /// Record an entry directly, for arranging inconsistent ledgers.
    pub fn force_entry(&self, entry: LedgerEntry) {
        self.accounts
            .lock()
            .unwrap()
            .entries
            .insert(entry.claim_id, entry);
    }
}

impl LedgerStore for NullLedger {
    fn credit(
        &self,
        user_id: &UserId,
        amount: Decimal,
        key: ClaimId,
        at: Timestamp,
    ) -> Result<CreditOutcome, StoreError> {
        self.credit_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_next_credit.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Backend("injected credit failure".to_string()));
        }

        let mut accounts = self.accounts.lock().unwrap();
        if let Some(existing) = accounts.entries.get(&key) {
            return Ok(CreditOutcome::AlreadyApplied(existing.clone()));
        }

        let balance = accounts.balances.get(user_id).cloned().unwrap_or_default();
        let updated = balance.credited(amount)?;
        let entry = LedgerEntry {
            claim_id: key,
            user_id: user_id.clone(),
            amount,
            credited_at: at,
        };
        accounts.balances.insert(user_id.clone(), updated);
        accounts.entries.insert(key, entry.clone());
        Ok(CreditOutcome::Applied(entry))
    }

    fn credit_for(&self, key: ClaimId) -> Result<Option<LedgerEntry>, StoreError> {
        Ok(self.accounts.lock().unwrap().entries.get(&key).cloned())
    }

    fn balance(&self, user_id: &UserId) -> Result<Balance, StoreError> {
        Ok(self
            .accounts
            .lock()
            .unwrap()
            .balances
            .get(user_id)
            .cloned()
            .unwrap_or_default())
    }
}
