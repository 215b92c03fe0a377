//! Transaction receipts as returned by `eth_getTransactionReceipt`.

use alloy_primitives::{Address, Bytes, B256, U64};
use serde::Deserialize;
use tally_types::TxHash;

/// Execution outcome recorded in a receipt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReceiptStatus {
    Success,
    Reverted,
}

/// One event log emitted by the transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Log {
    /// Contract that emitted the log.
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
    /// Set by the node when the log was dropped in a reorg.
    pub removed: bool,
}

/// A mined transaction's receipt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Receipt {
    pub tx_hash: TxHash,
    pub block_number: u64,
    pub status: ReceiptStatus,
    pub logs: Vec<Log>,
}

/// Raw JSON shape of a receipt.
///
/// `blockNumber` is `null` for receipts some nodes return while the
/// transaction is still pending; `status` is absent on pre-Byzantium receipts.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RpcReceipt {
    pub transaction_hash: B256,
    #[serde(default)]
    pub block_number: Option<U64>,
    #[serde(default)]
    pub status: Option<U64>,
    #[serde(default)]
    pub logs: Vec<RpcLog>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RpcLog {
    pub address: Address,
    #[serde(default)]
    pub topics: Vec<B256>,
    #[serde(default)]
    pub data: Bytes,
    #[serde(default)]
    pub removed: bool,
}

impl RpcReceipt {
    /// Convert to a [`Receipt`]; `None` while the receipt has no block yet.
    pub(crate) fn into_receipt(self) -> Option<Receipt> {
        let block_number = self.block_number?.to::<u64>();
        let status = match self.status {
            Some(s) if s.is_zero() => ReceiptStatus::Reverted,
            _ => ReceiptStatus::Success,
        };
        Some(Receipt {
            tx_hash: TxHash::new(self.transaction_hash.0),
            block_number,
            status,
            logs: self
                .logs
                .into_iter()
                .map(|l| Log {
                    address: l.address,
                    topics: l.topics,
                    data: l.data,
                    removed: l.removed,
                })
                .collect(),
        })
    }
}
