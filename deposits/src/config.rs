//! Deposit engine configuration, the `[deposits]` table of the node config.

use std::str::FromStr;
use std::time::Duration;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tally_types::ChainAddress;

use crate::{DepositError, RetryPolicy};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DepositConfig {
    /// JSON-RPC endpoint of the chain node.
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,

    /// ERC-20 contract whose transfers count as deposits.
    #[serde(default = "default_token_contract", with = "address_str")]
    pub token_contract: ChainAddress,

    /// Platform address deposits must be sent to.
    #[serde(default = "default_deposit_address", with = "address_str")]
    pub deposit_address: ChainAddress,

    /// Decimal exponent of the token.
    #[serde(default = "default_token_decimals")]
    pub token_decimals: u32,

    /// Blocks on top of the transaction's block before it counts as final.
    #[serde(default = "default_required_confirmations")]
    pub required_confirmations: u64,

    /// Tolerance for decimal conversion rounding when comparing amounts.
    #[serde(default = "default_amount_epsilon", with = "rust_decimal::serde::str")]
    pub amount_epsilon: Decimal,

    /// Retryable verdicts allowed per claim before it is rejected.
    #[serde(default = "default_retry_budget")]
    pub retry_budget: u32,

    /// `NoMatchingTransfer` verdicts allowed per claim before it is rejected.
    #[serde(default = "default_no_match_retry_budget")]
    pub no_match_retry_budget: u32,

    /// Budget for the chain calls of one verification attempt.
    #[serde(default = "default_rpc_timeout_secs")]
    pub rpc_timeout_secs: u64,

    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Base backoff between attempts on the same claim; doubles per attempt.
    #[serde(default = "default_sweep_cooldown_secs")]
    pub sweep_cooldown_secs: u64,

    #[serde(default = "default_max_cooldown_secs")]
    pub max_cooldown_secs: u64,

    /// How long after submission a never-mined transaction is given up on.
    #[serde(default = "default_not_found_horizon_secs")]
    pub not_found_horizon_secs: u64,

    /// Claims attempted per sweep.
    #[serde(default = "default_sweep_batch_size")]
    pub sweep_batch_size: usize,
}

fn default_rpc_url() -> String {
    "http://127.0.0.1:8545".to_string()
}
fn default_token_contract() -> ChainAddress {
    // BEP-20 USDT, 18 decimals.
    ChainAddress::new([
        0x55, 0xd3, 0x98, 0x32, 0x6f, 0x99, 0x05, 0x9f, 0xf7, 0x75, 0x48, 0x52, 0x46, 0x99, 0x90,
        0x27, 0xb3, 0x19, 0x79, 0x55,
    ])
}
fn default_deposit_address() -> ChainAddress {
    ChainAddress::ZERO
}
fn default_token_decimals() -> u32 {
    18
}
fn default_required_confirmations() -> u64 {
    12
}
fn default_amount_epsilon() -> Decimal {
    Decimal::new(1, 6)
}
fn default_retry_budget() -> u32 {
    40
}
fn default_no_match_retry_budget() -> u32 {
    5
}
fn default_rpc_timeout_secs() -> u64 {
    10
}
fn default_sweep_interval_secs() -> u64 {
    30
}
fn default_sweep_cooldown_secs() -> u64 {
    30
}
fn default_max_cooldown_secs() -> u64 {
    1800
}
fn default_not_found_horizon_secs() -> u64 {
    86_400
}
fn default_sweep_batch_size() -> usize {
    100
}

impl Default for DepositConfig {
    fn default() -> Self {
        Self {
            rpc_url: default_rpc_url(),
            token_contract: default_token_contract(),
            deposit_address: default_deposit_address(),
            token_decimals: default_token_decimals(),
            required_confirmations: default_required_confirmations(),
            amount_epsilon: default_amount_epsilon(),
            retry_budget: default_retry_budget(),
            no_match_retry_budget: default_no_match_retry_budget(),
            rpc_timeout_secs: default_rpc_timeout_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            sweep_cooldown_secs: default_sweep_cooldown_secs(),
            max_cooldown_secs: default_max_cooldown_secs(),
            not_found_horizon_secs: default_not_found_horizon_secs(),
            sweep_batch_size: default_sweep_batch_size(),
        }
    }
}

impl DepositConfig {
    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<(), DepositError> {
        if self.deposit_address == ChainAddress::ZERO {
            return Err(DepositError::Config(
                "deposit_address must be set".to_string(),
            ));
        }
        if self.token_contract == ChainAddress::ZERO {
            return Err(DepositError::Config(
                "token_contract must be set".to_string(),
            ));
        }
        if self.amount_epsilon.is_sign_negative() {
            return Err(DepositError::Config(
                "amount_epsilon must not be negative".to_string(),
            ));
        }
        if self.token_decimals > 77 {
            return Err(DepositError::Config(format!(
                "token_decimals {} exceeds the uint256 range",
                self.token_decimals
            )));
        }
        if self.rpc_timeout_secs == 0 || self.sweep_interval_secs == 0 {
            return Err(DepositError::Config(
                "rpc_timeout_secs and sweep_interval_secs must be positive".to_string(),
            ));
        }
        if self.sweep_batch_size == 0 {
            return Err(DepositError::Config(
                "sweep_batch_size must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc_timeout_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            retry_budget: self.retry_budget,
            no_match_retry_budget: self.no_match_retry_budget,
            not_found_horizon_secs: self.not_found_horizon_secs,
            cooldown_secs: self.sweep_cooldown_secs,
            max_cooldown_secs: self.max_cooldown_secs,
        }
    }
}

/// Addresses are written as `0x`-prefixed hex in config files.
mod address_str {
    use super::*;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(addr: &ChainAddress, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(addr)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<ChainAddress, D::Error> {
        let raw = String::deserialize(d)?;
        ChainAddress::from_str(&raw).map_err(serde::de::Error::custom)
    }
}
