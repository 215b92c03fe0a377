//! Nullable chain: a scripted node for testing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use alloy_primitives::{Address, Bytes, U256};
use async_trait::async_trait;

use tally_chain::{ChainClient, ChainError, Log, Receipt, ReceiptStatus, TRANSFER_TOPIC};
use tally_types::TxHash;

/// Build an ERC-20 `Transfer` log.
pub fn transfer_log(token: Address, from: Address, to: Address, value: U256) -> Log {
    Log {
        address: token,
        topics: vec![TRANSFER_TOPIC, from.into_word(), to.into_word()],
        data: Bytes::from(value.to_be_bytes::<32>().to_vec()),
        removed: false,
    }
}

/// An in-memory chain node.
///
/// Receipts and the block height are set by the test. Outages and slow
/// responses can be injected, and every call is counted.
#[derive(Default)]
pub struct NullChain {
    receipts: Mutex<HashMap<TxHash, Receipt>>,
    height: AtomicU64,
    offline: AtomicBool,
    delay: Mutex<Option<Duration>>,
    receipt_calls: AtomicU64,
    height_calls: AtomicU64,
}

impl NullChain {
    pub fn new(height: u64) -> Self {
        Self {
            height: AtomicU64::new(height),
            ..Default::default()
        }
    }

    pub fn set_height(&self, height: u64) {
        self.height.store(height, Ordering::SeqCst);
    }

    pub fn advance_height(&self, blocks: u64) {
        self.height.fetch_add(blocks, Ordering::SeqCst);
    }

    pub fn insert_receipt(&self, receipt: Receipt) {
        self.receipts
            .lock()
            .unwrap()
            .insert(receipt.tx_hash, receipt);
    }

    /// Mine a successful transaction carrying the given logs.
    pub fn mine(&self, tx_hash: TxHash, block_number: u64, logs: Vec<Log>) {
        self.insert_receipt(Receipt {
            tx_hash,
            block_number,
            status: ReceiptStatus::Success,
            logs,
        });
    }

    /// Mine a reverted transaction.
    pub fn mine_reverted(&self, tx_hash: TxHash, block_number: u64) {
        self.insert_receipt(Receipt {
            tx_hash,
            block_number,
            status: ReceiptStatus::Reverted,
            logs: Vec::new(),
        });
    }

    /// Make every call fail with [`ChainError::Unavailable`].
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Make every call sleep before answering.
    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn receipt_calls(&self) -> u64 {
        self.receipt_calls.load(Ordering::SeqCst)
    }

    pub fn height_calls(&self) -> u64 {
        self.height_calls.load(Ordering::SeqCst)
    }

    async fn respond(&self) -> Result<(), ChainError> {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.offline.load(Ordering::SeqCst) {
            return Err(ChainError::Unavailable("null chain is offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ChainClient for NullChain {
    async fn get_receipt(&self, tx_hash: &TxHash) -> Result<Option<Receipt>, ChainError> {
        self.receipt_calls.fetch_add(1, Ordering::SeqCst);
        self.respond().await?;
        Ok(self.receipts.lock().unwrap().get(tx_hash).cloned())
    }

    async fn block_height(&self) -> Result<u64, ChainError> {
        self.height_calls.fetch_add(1, Ordering::SeqCst);
        self.respond().await?;
        Ok(self.height.load(Ordering::SeqCst))
    }
}
