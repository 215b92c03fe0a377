//! EVM chain access for deposit verification.
//!
//! - [`client`]: the [`ChainClient`] seam and its JSON-RPC implementation
//!   (`eth_getTransactionReceipt`, `eth_blockNumber`).
//! - [`decoder`]: typed decoding of ERC-20 `Transfer(address,address,uint256)` logs
//!   and 256-bit summation of the value sent to one recipient.
//! - [`amount`]: conversion of raw token units to a fixed-point decimal.
//! - [`confirmations`]: confirmation depth from two block heights.

pub mod amount;
pub mod client;
pub mod confirmations;
pub mod decoder;
pub mod error;
pub mod receipt;

pub use amount::{decimal_to_raw, raw_to_decimal};
pub use client::{ChainClient, JsonRpcChainClient};
pub use confirmations::confirmations;
pub use decoder::{decode_transfer, sum_transfers_to, LogDecodeError, TransferEvent, TRANSFER_TOPIC};
pub use error::ChainError;
pub use receipt::{Log, Receipt, ReceiptStatus};
