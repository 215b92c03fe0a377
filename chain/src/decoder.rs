//! ERC-20 `Transfer` log decoding.
//!
//! Every log in a receipt is either a well-formed `Transfer(address,address,uint256)`
//! emitted by the token contract or something else. [`decode_transfer`] says
//! which, per entry, with a typed reason; [`sum_transfers_to`] keeps the
//! transfers to one recipient and adds their values in 256-bit arithmetic.

use alloy_primitives::{b256, Address, B256, U256};
use thiserror::Error;

use crate::receipt::Log;

/// `keccak256("Transfer(address,address,uint256)")`.
pub const TRANSFER_TOPIC: B256 =
    b256!("ddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef");

/// A decoded ERC-20 transfer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransferEvent {
    pub token: Address,
    pub from: Address,
    pub to: Address,
    pub value: U256,
}

/// Why a log is not a standard ERC-20 transfer.
///
/// These are expected for every other event type a transaction emits; they
/// are reported, not raised.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum LogDecodeError {
    #[error("log has no topics")]
    Anonymous,

    #[error("topic0 {0} is not the Transfer signature")]
    WrongSignature(B256),

    #[error("Transfer log has {0} topics, expected 3")]
    TopicCount(usize),

    #[error("Transfer log data is {0} bytes, expected 32")]
    DataLength(usize),

    #[error("indexed address topic has non-zero padding")]
    DirtyAddressPadding,
}

/// Decode one log as an ERC-20 `Transfer`.
///
/// ERC-721 transfers share the signature but index the token id as a fourth
/// topic with empty data; they fail with [`LogDecodeError::TopicCount`].
pub fn decode_transfer(log: &Log) -> Result<TransferEvent, LogDecodeError> {
    let topic0 = log.topics.first().ok_or(LogDecodeError::Anonymous)?;
    if *topic0 != TRANSFER_TOPIC {
        return Err(LogDecodeError::WrongSignature(*topic0));
    }
    if log.topics.len() != 3 {
        return Err(LogDecodeError::TopicCount(log.topics.len()));
    }
    if log.data.len() != 32 {
        return Err(LogDecodeError::DataLength(log.data.len()));
    }

    Ok(TransferEvent {
        token: log.address,
        from: topic_to_address(&log.topics[1])?,
        to: topic_to_address(&log.topics[2])?,
        value: U256::from_be_slice(&log.data),
    })
}

fn topic_to_address(topic: &B256) -> Result<Address, LogDecodeError> {
    if topic[..12].iter().any(|&b| b != 0) {
        return Err(LogDecodeError::DirtyAddressPadding);
    }
    Ok(Address::from_word(*topic))
}

/// Total raw value the `token` contract transferred to `recipient` in `logs`.
///
/// Logs from other contracts, logs removed by a reorg and logs that are not
/// transfers are skipped. Summing (rather than taking the first match) covers
/// relays that batch several transfers to the same recipient.
pub fn sum_transfers_to(logs: &[Log], token: Address, recipient: Address) -> U256 {
    logs.iter()
        .filter(|log| log.address == token && !log.removed)
        .filter_map(|log| match decode_transfer(log) {
            Ok(event) => Some(event),
            Err(e) => {
                tracing::trace!(error = %e, "skipping non-transfer log");
                None
            }
        })
        .filter(|event| event.to == recipient)
        .fold(U256::ZERO, |acc, event| acc.saturating_add(event.value))
}
