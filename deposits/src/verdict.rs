use rust_decimal::Decimal;
use serde::Serialize;
use tally_types::VerdictReason;

/// Result of one verification attempt.
///
/// Never persisted on its own; it drives the claim transition and is logged.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct VerificationVerdict {
    pub verified: bool,
    pub confirmations: u64,
    #[serde(with = "rust_decimal::serde::str_option")]
    pub amount_on_chain: Option<Decimal>,
    pub reason: Option<VerdictReason>,
}

impl VerificationVerdict {
    pub fn verified(confirmations: u64, amount_on_chain: Decimal) -> Self {
        Self {
            verified: true,
            confirmations,
            amount_on_chain: Some(amount_on_chain),
            reason: None,
        }
    }

    /// A failed attempt that got no further than `reason`.
    pub fn failed(reason: VerdictReason) -> Self {
        Self {
            verified: false,
            confirmations: 0,
            amount_on_chain: None,
            reason: Some(reason),
        }
    }

    pub fn with_amount(mut self, amount: Decimal) -> Self {
        self.amount_on_chain = Some(amount);
        self
    }

    pub fn with_confirmations(mut self, confirmations: u64) -> Self {
        self.confirmations = confirmations;
        self
    }

    /// The reason this attempt did not verify, if it did not.
    pub fn failure(&self) -> Option<VerdictReason> {
        if self.verified {
            None
        } else {
            Some(self.reason.unwrap_or(VerdictReason::RpcUnavailable))
        }
    }
}
