//! LMDB implementation of LedgerStore.

use std::sync::Arc;

use heed::types::Bytes;
use heed::{Database, Env, RoTxn};
use rust_decimal::Decimal;

use tally_store::{Balance, CreditOutcome, LedgerEntry, LedgerStore, StoreError};
use tally_types::{ClaimId, Timestamp, UserId};

use crate::LmdbError;

pub struct LmdbLedgerStore {
    pub(crate) env: Arc<Env>,
    pub(crate) credits_db: Database<Bytes, Bytes>,
    pub(crate) balances_db: Database<Bytes, Bytes>,
}

impl LmdbLedgerStore {
    fn load_entry(&self, txn: &RoTxn, key: ClaimId) -> Result<Option<LedgerEntry>, LmdbError> {
        match self.credits_db.get(txn, &key.to_key())? {
            Some(bytes) => Ok(Some(bincode::deserialize(bytes)?)),
            None => Ok(None),
        }
    }

    fn load_balance(&self, txn: &RoTxn, user_id: &UserId) -> Result<Balance, LmdbError> {
        match self.balances_db.get(txn, user_id.as_str().as_bytes())? {
            Some(bytes) => Ok(bincode::deserialize(bytes)?),
            None => Ok(Balance::default()),
        }
    }
}

impl LedgerStore for LmdbLedgerStore {
    fn credit(
        &self,
        user_id: &UserId,
        amount: Decimal,
        key: ClaimId,
        at: Timestamp,
    ) -> Result<CreditOutcome, StoreError> {
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;

        if let Some(existing) = self.load_entry(&wtxn, key)? {
            // Dropping the transaction aborts it; nothing was written.
            return Ok(CreditOutcome::AlreadyApplied(existing));
        }

        let updated = self.load_balance(&wtxn, user_id)?.credited(amount)?;
        let entry = LedgerEntry {
            claim_id: key,
            user_id: user_id.clone(),
            amount,
            credited_at: at,
        };

        let entry_bytes = bincode::serialize(&entry).map_err(LmdbError::from)?;
        let balance_bytes = bincode::serialize(&updated).map_err(LmdbError::from)?;
        self.credits_db
            .put(&mut wtxn, &key.to_key(), &entry_bytes)
            .map_err(LmdbError::from)?;
        self.balances_db
            .put(&mut wtxn, user_id.as_str().as_bytes(), &balance_bytes)
            .map_err(LmdbError::from)?;
        wtxn.commit().map_err(LmdbError::from)?;

        tracing::debug!(claim_id = %key, user_id = %user_id, %amount, "ledger credit applied");
        Ok(CreditOutcome::Applied(entry))
    }

    fn credit_for(&self, key: ClaimId) -> Result<Option<LedgerEntry>, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        Ok(self.load_entry(&rtxn, key)?)
    }

    fn balance(&self, user_id: &UserId) -> Result<Balance, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        Ok(self.load_balance(&rtxn, user_id)?)
    }
}
