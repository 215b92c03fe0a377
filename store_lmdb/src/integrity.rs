//! Cross-database consistency checks.
//!
//! Run on startup and by the `reconcile` command to detect index drift or a
//! ledger that disagrees with the claims it was credited for.

use tally_store::{DepositClaim, LedgerEntry};
use tally_types::{ClaimId, ClaimStatus};

use crate::claim::decode_claim;
use crate::keys::{status_key, trailing_claim_id};
use crate::{LmdbEnvironment, LmdbError};

/// Summary of an integrity check run.
#[derive(Debug, Default)]
pub struct IntegrityReport {
    pub claims_checked: u64,
    pub credits_checked: u64,
    /// Claims left in `Verified`, i.e. awaiting a credit attempt.
    pub awaiting_credit: Vec<ClaimId>,
    pub errors: Vec<String>,
}

impl IntegrityReport {
    /// Returns `true` if no errors were detected.
    pub fn is_healthy(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Walk every claim and ledger entry and cross-check the indexes.
///
/// Read failures of individual rows are recorded in the report rather than
/// aborting the run.
pub fn check_integrity(environment: &LmdbEnvironment) -> Result<IntegrityReport, LmdbError> {
    let mut report = IntegrityReport::default();
    let rtxn = environment.env.read_txn()?;

    for result in environment.claims_db.iter(&rtxn)? {
        let (_, bytes) = result?;
        report.claims_checked += 1;
        let claim: DepositClaim = match decode_claim(bytes) {
            Ok(claim) => claim,
            Err(e) => {
                report.errors.push(format!("undecodable claim row: {e}"));
                continue;
            }
        };

        let indexed = environment
            .status_index_db
            .get(&rtxn, &status_key(claim.status, claim.id))?
            .is_some();
        if !indexed {
            report
                .errors
                .push(format!("claim {} missing from {} index", claim.id, claim.status));
        }

        let credit = environment.credits_db.get(&rtxn, &claim.id.to_key())?;
        match (claim.status, credit.is_some()) {
            (ClaimStatus::Credited, false) => report
                .errors
                .push(format!("claim {} is credited but has no ledger entry", claim.id)),
            (ClaimStatus::Verified, _) => report.awaiting_credit.push(claim.id),
            (ClaimStatus::Credited, true) | (ClaimStatus::Failed, _) => {}
            (status, true) => report
                .errors
                .push(format!("claim {} is {} but has a ledger entry", claim.id, status)),
            (_, false) => {}
        }
    }

    for result in environment.tx_index_db.iter(&rtxn)? {
        let (tx_key, owner) = result?;
        let owner = trailing_claim_id(owner)?;
        match environment.claims_db.get(&rtxn, &owner.to_key())? {
            Some(bytes) => match decode_claim(bytes) {
                Ok(claim) if claim.tx_hash.as_bytes().as_slice() == tx_key => {}
                Ok(claim) => report.errors.push(format!(
                    "tx index entry points at claim {} with a different hash",
                    claim.id
                )),
                Err(_) => {}
            },
            None => report
                .errors
                .push(format!("tx index entry points at missing claim {owner}")),
        }
    }

    for result in environment.credits_db.iter(&rtxn)? {
        let (key, bytes) = result?;
        report.credits_checked += 1;
        let entry: LedgerEntry = match bincode::deserialize(bytes) {
            Ok(entry) => entry,
            Err(e) => {
                report.errors.push(format!("undecodable ledger entry: {e}"));
                continue;
            }
        };
        if entry.claim_id.to_key().as_slice() != key {
            report
                .errors
                .push(format!("ledger entry for claim {} stored under wrong key", entry.claim_id));
        }
        if environment.claims_db.get(&rtxn, &key)?.is_none() {
            report
                .errors
                .push(format!("ledger entry for unknown claim {}", entry.claim_id));
        }
    }

    Ok(report)
}
