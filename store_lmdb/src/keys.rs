//! Binary key layouts.
//!
//! - `claims`: `claim_id_be(8)` → bincode `DepositClaim`
//! - `tx_index`: `tx_hash(32)` → `claim_id_be(8)` of the owning claim
//! - `status_index`: `status(1) ++ claim_id_be(8)` → empty
//! - `user_claims`: `user_len_be(4) ++ user ++ claim_id_be(8)` → empty
//! - `credits`: `claim_id_be(8)` → bincode `LedgerEntry`
//! - `balances`: `user` → bincode `Balance`
//!
//! Big-endian ids make every range scan come back in creation order.

use tally_types::{ClaimId, ClaimStatus, UserId};

use crate::LmdbError;

pub(crate) fn status_code(status: ClaimStatus) -> u8 {
    match status {
        ClaimStatus::Pending => 0,
        ClaimStatus::Verifying => 1,
        ClaimStatus::Verified => 2,
        ClaimStatus::Credited => 3,
        ClaimStatus::Rejected => 4,
        ClaimStatus::Failed => 5,
    }
}

pub(crate) fn status_key(status: ClaimStatus, id: ClaimId) -> [u8; 9] {
    let mut key = [0u8; 9];
    key[0] = status_code(status);
    key[1..].copy_from_slice(&id.to_key());
    key
}

pub(crate) fn user_prefix(user_id: &UserId) -> Vec<u8> {
    let raw = user_id.as_str().as_bytes();
    let mut key = Vec::with_capacity(4 + raw.len() + 8);
    key.extend_from_slice(&(raw.len() as u32).to_be_bytes());
    key.extend_from_slice(raw);
    key
}

pub(crate) fn user_claim_key(user_id: &UserId, id: ClaimId) -> Vec<u8> {
    let mut key = user_prefix(user_id);
    key.extend_from_slice(&id.to_key());
    key
}

/// Parse the claim id stored in the last eight bytes of an index key.
pub(crate) fn trailing_claim_id(key: &[u8]) -> Result<ClaimId, LmdbError> {
    let start = key
        .len()
        .checked_sub(8)
        .ok_or_else(|| LmdbError::Corruption(format!("index key too short: {} bytes", key.len())))?;
    let mut arr = [0u8; 8];
    arr.copy_from_slice(&key[start..]);
    Ok(ClaimId::from_key(arr))
}

/// Smallest key strictly greater than every key starting with `prefix`.
///
/// Returns `None` when the prefix is all `0xff`, meaning the scan is unbounded.
pub(crate) fn prefix_upper_bound(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut upper = prefix.to_vec();
    while let Some(last) = upper.pop() {
        if last < 0xff {
            upper.push(last + 1);
            return Some(upper);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upper_bound_carries() {
        assert_eq!(prefix_upper_bound(&[1, 2, 3]), Some(vec![1, 2, 4]));
        assert_eq!(prefix_upper_bound(&[1, 0xff]), Some(vec![2]));
        assert_eq!(prefix_upper_bound(&[0xff, 0xff]), None);
    }

    #[test]
    fn user_prefixes_do_not_overlap() {
        let a = UserId::new("ab").unwrap();
        let b = UserId::new("abc").unwrap();
        let key_b = user_claim_key(&b, ClaimId::new(1));
        assert!(!key_b.starts_with(&user_prefix(&a)));
    }

    #[test]
    fn trailing_id_round_trips() {
        let key = status_key(ClaimStatus::Verified, ClaimId::new(77));
        assert_eq!(trailing_claim_id(&key).unwrap(), ClaimId::new(77));
        assert!(trailing_claim_id(&[1, 2]).is_err());
    }
}
