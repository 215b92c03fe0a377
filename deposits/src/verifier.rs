//! Independent on-chain verification of one deposit claim.

use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::Address;
use rust_decimal::Decimal;
use tally_chain::{
    confirmations, raw_to_decimal, sum_transfers_to, ChainClient, ChainError, ReceiptStatus,
};
use tally_store::DepositClaim;
use tally_types::{ChainAddress, TxHash, VerdictReason};

use crate::{DepositConfig, VerificationVerdict};

/// What is being checked.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerificationRequest {
    pub tx_hash: TxHash,
    pub expected_recipient: ChainAddress,
    pub claimed_amount: Decimal,
    pub required_confirmations: u64,
}

impl VerificationRequest {
    pub fn for_claim(claim: &DepositClaim, required_confirmations: u64) -> Self {
        Self {
            tx_hash: claim.tx_hash,
            expected_recipient: claim.expected_recipient,
            claimed_amount: claim.claimed_amount,
            required_confirmations,
        }
    }
}

/// Turns chain state into a [`VerificationVerdict`].
///
/// Never fails: chain errors and timeouts become
/// [`VerdictReason::RpcUnavailable`], which is always retryable.
pub struct DepositVerifier {
    chain: Arc<dyn ChainClient>,
    token: Address,
    decimals: u32,
    epsilon: Decimal,
    timeout: Duration,
}

impl DepositVerifier {
    pub fn new(chain: Arc<dyn ChainClient>, config: &DepositConfig) -> Self {
        Self {
            chain,
            token: Address::from(*config.token_contract.as_bytes()),
            decimals: config.token_decimals,
            epsilon: config.amount_epsilon,
            timeout: config.rpc_timeout(),
        }
    }

    /// Run one verification attempt within the per-attempt time budget.
    pub async fn verify(&self, request: &VerificationRequest) -> VerificationVerdict {
        let result = match tokio::time::timeout(self.timeout, self.attempt(request)).await {
            Ok(result) => result,
            Err(_) => Err(ChainError::timeout(self.timeout)),
        };

        match result {
            Ok(verdict) => {
                tracing::debug!(
                    tx_hash = %request.tx_hash,
                    verified = verdict.verified,
                    confirmations = verdict.confirmations,
                    reason = ?verdict.reason,
                    "verification verdict"
                );
                verdict
            }
            Err(e) => {
                tracing::warn!(tx_hash = %request.tx_hash, error = %e, "chain unavailable during verification");
                VerificationVerdict::failed(VerdictReason::RpcUnavailable)
            }
        }
    }

    async fn attempt(&self, request: &VerificationRequest) -> Result<VerificationVerdict, ChainError> {
        let Some(receipt) = self.chain.get_receipt(&request.tx_hash).await? else {
            return Ok(VerificationVerdict::failed(VerdictReason::NotFound));
        };

        if receipt.status == ReceiptStatus::Reverted {
            return Ok(VerificationVerdict::failed(VerdictReason::TxFailed));
        }

        let recipient = Address::from(*request.expected_recipient.as_bytes());
        let raw = sum_transfers_to(&receipt.logs, self.token, recipient);
        if raw.is_zero() {
            return Ok(VerificationVerdict::failed(VerdictReason::NoMatchingTransfer));
        }

        let amount = raw_to_decimal(raw, self.decimals);
        let short = amount
            .checked_add(self.epsilon)
            .is_some_and(|tolerated| tolerated < request.claimed_amount);
        if short {
            return Ok(VerificationVerdict::failed(VerdictReason::AmountMismatch).with_amount(amount));
        }

        let height = self.chain.block_height().await?;
        let depth = confirmations(height, receipt.block_number);
        if depth < request.required_confirmations {
            return Ok(
                VerificationVerdict::failed(VerdictReason::InsufficientConfirmations)
                    .with_confirmations(depth)
                    .with_amount(amount),
            );
        }

        Ok(VerificationVerdict::verified(depth, amount))
    }
}
