//! LMDB implementation of ClaimStore.
//!
//! A claim row and all of its index entries are written in the same write
//! transaction, and LMDB serialises writers, so the tx hash ownership check
//! and the status compare-and-set are atomic across threads and processes.

use std::ops::Bound;
use std::sync::Arc;

use heed::types::Bytes;
use heed::{Database, Env, RoTxn, RwTxn};

use tally_store::{ClaimStore, DepositClaim, NewClaim, StoreError};
use tally_types::{ClaimId, ClaimStatus, TxHash, UserId};

use crate::keys::{
    prefix_upper_bound, status_code, status_key, trailing_claim_id, user_claim_key, user_prefix,
};
use crate::LmdbError;

const NEXT_CLAIM_ID_KEY: &[u8] = b"next_claim_id";

pub struct LmdbClaimStore {
    pub(crate) env: Arc<Env>,
    pub(crate) claims_db: Database<Bytes, Bytes>,
    pub(crate) tx_index_db: Database<Bytes, Bytes>,
    pub(crate) status_index_db: Database<Bytes, Bytes>,
    pub(crate) user_claims_db: Database<Bytes, Bytes>,
    pub(crate) meta_db: Database<Bytes, Bytes>,
}

pub(crate) fn decode_claim(bytes: &[u8]) -> Result<DepositClaim, LmdbError> {
    Ok(bincode::deserialize(bytes)?)
}

/// Keys of every entry whose key starts with `prefix`, in key order.
pub(crate) fn scan_prefix(
    db: &Database<Bytes, Bytes>,
    txn: &RoTxn,
    prefix: &[u8],
) -> Result<Vec<Vec<u8>>, LmdbError> {
    let upper = prefix_upper_bound(prefix);
    let bounds = (
        Bound::Included(prefix),
        match upper.as_deref() {
            Some(upper) => Bound::Excluded(upper),
            None => Bound::Unbounded,
        },
    );
    let mut keys = Vec::new();
    for result in db.range(txn, &bounds)? {
        let (key, _) = result?;
        keys.push(key.to_vec());
    }
    Ok(keys)
}

impl LmdbClaimStore {
    fn allocate_id(&self, wtxn: &mut RwTxn) -> Result<ClaimId, LmdbError> {
        let next = match self.meta_db.get(wtxn, NEXT_CLAIM_ID_KEY)? {
            Some(bytes) => {
                let arr: [u8; 8] = bytes.try_into().map_err(|_| {
                    LmdbError::Corruption("next_claim_id has unexpected byte length".to_string())
                })?;
                u64::from_be_bytes(arr)
            }
            None => 1,
        };
        let following = next
            .checked_add(1)
            .ok_or_else(|| LmdbError::Corruption("claim id sequence exhausted".to_string()))?;
        self.meta_db
            .put(wtxn, NEXT_CLAIM_ID_KEY, &following.to_be_bytes())?;
        Ok(ClaimId::new(next))
    }

    fn load(&self, txn: &RoTxn, id: ClaimId) -> Result<Option<DepositClaim>, LmdbError> {
        match self.claims_db.get(txn, &id.to_key())? {
            Some(bytes) => {
                let claim = decode_claim(bytes)?;
                if claim.id != id {
                    return Err(LmdbError::Corruption(format!(
                        "claim row {} holds claim {}",
                        id, claim.id
                    )));
                }
                Ok(Some(claim))
            }
            None => Ok(None),
        }
    }

    fn load_existing(&self, txn: &RoTxn, id: ClaimId) -> Result<DepositClaim, LmdbError> {
        self.load(txn, id)?
            .ok_or_else(|| LmdbError::Corruption(format!("index references missing claim {id}")))
    }

    fn write_row(&self, wtxn: &mut RwTxn, claim: &DepositClaim) -> Result<(), LmdbError> {
        let bytes = bincode::serialize(claim)?;
        self.claims_db.put(wtxn, &claim.id.to_key(), &bytes)?;
        Ok(())
    }
}

impl ClaimStore for LmdbClaimStore {
    fn insert_claim(&self, new: NewClaim) -> Result<DepositClaim, StoreError> {
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        let id = self.allocate_id(&mut wtxn)?;

        let owned = self
            .tx_index_db
            .get(&wtxn, new.tx_hash.as_bytes().as_slice())
            .map_err(LmdbError::from)?
            .is_some();
        let status = if owned {
            ClaimStatus::Rejected
        } else {
            ClaimStatus::Pending
        };
        let claim = DepositClaim::from_new(id, new, status);

        if !owned {
            self.tx_index_db
                .put(&mut wtxn, claim.tx_hash.as_bytes().as_slice(), &id.to_key())
                .map_err(LmdbError::from)?;
        }
        self.write_row(&mut wtxn, &claim)?;
        self.status_index_db
            .put(&mut wtxn, &status_key(status, id), &[])
            .map_err(LmdbError::from)?;
        self.user_claims_db
            .put(&mut wtxn, &user_claim_key(&claim.user_id, id), &[])
            .map_err(LmdbError::from)?;

        wtxn.commit().map_err(LmdbError::from)?;
        Ok(claim)
    }

    fn get_claim(&self, id: ClaimId) -> Result<Option<DepositClaim>, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        Ok(self.load(&rtxn, id)?)
    }

    fn claim_by_tx_hash(&self, tx_hash: &TxHash) -> Result<Option<DepositClaim>, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        let owner = match self
            .tx_index_db
            .get(&rtxn, tx_hash.as_bytes().as_slice())
            .map_err(LmdbError::from)?
        {
            Some(bytes) => trailing_claim_id(bytes)?,
            None => return Ok(None),
        };
        Ok(Some(self.load_existing(&rtxn, owner)?))
    }

    fn update_claim(&self, claim: &DepositClaim, expected: ClaimStatus) -> Result<(), StoreError> {
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        let current = self
            .load(&wtxn, claim.id)?
            .ok_or_else(|| StoreError::NotFound(format!("claim {}", claim.id)))?;

        if current.status != expected {
            return Err(StoreError::Conflict {
                id: claim.id.to_string(),
                expected,
                actual: current.status,
            });
        }
        if current.tx_hash != claim.tx_hash || current.user_id != claim.user_id {
            return Err(StoreError::Backend(format!(
                "claim {} identity fields are immutable",
                claim.id
            )));
        }

        self.write_row(&mut wtxn, claim)?;
        if current.status != claim.status {
            self.status_index_db
                .delete(&mut wtxn, &status_key(current.status, claim.id))
                .map_err(LmdbError::from)?;
            self.status_index_db
                .put(&mut wtxn, &status_key(claim.status, claim.id), &[])
                .map_err(LmdbError::from)?;
        }

        wtxn.commit().map_err(LmdbError::from)?;
        Ok(())
    }

    fn claims_with_status(
        &self,
        statuses: &[ClaimStatus],
        after: Option<ClaimId>,
        limit: usize,
    ) -> Result<Vec<DepositClaim>, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        let first = match after {
            Some(id) => match id.get().checked_add(1) {
                Some(next) => ClaimId::new(next),
                None => return Ok(Vec::new()),
            },
            None => ClaimId::new(0),
        };

        let mut ids = Vec::new();
        for status in statuses {
            let start = status_key(*status, first);
            let end = [status_code(*status) + 1];
            let bounds = (Bound::Included(&start[..]), Bound::Excluded(&end[..]));
            let range = self
                .status_index_db
                .range(&rtxn, &bounds)
                .map_err(LmdbError::from)?;
            for result in range.take(limit) {
                let (key, _) = result.map_err(LmdbError::from)?;
                ids.push(trailing_claim_id(key)?);
            }
        }
        ids.sort();
        ids.dedup();
        ids.truncate(limit);

        let mut claims = Vec::with_capacity(ids.len());
        for id in ids {
            claims.push(self.load_existing(&rtxn, id)?);
        }
        Ok(claims)
    }

    fn count_with_status(&self, statuses: &[ClaimStatus]) -> Result<u64, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        let mut count = 0u64;
        for status in statuses {
            let prefix = [status_code(*status)];
            let entries = self
                .status_index_db
                .prefix_iter(&rtxn, &prefix[..])
                .map_err(LmdbError::from)?;
            for result in entries {
                result.map_err(LmdbError::from)?;
                count += 1;
            }
        }
        Ok(count)
    }

    fn claims_for_user(&self, user_id: &UserId) -> Result<Vec<DepositClaim>, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        let keys = scan_prefix(&self.user_claims_db, &rtxn, &user_prefix(user_id))?;
        let mut claims = Vec::with_capacity(keys.len());
        for key in keys {
            let id = trailing_claim_id(&key)?;
            claims.push(self.load_existing(&rtxn, id)?);
        }
        Ok(claims)
    }

    fn claim_count(&self) -> Result<u64, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        Ok(self.claims_db.len(&rtxn).map_err(LmdbError::from)?)
    }
}
