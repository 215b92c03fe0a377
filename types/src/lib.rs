//! Fundamental types for the Tally deposit engine.
//!
//! This crate defines the core types shared across every other crate in the workspace:
//! chain addresses, transaction hashes, claim and user identifiers, timestamps,
//! and the claim status / verdict reason enums.

pub mod address;
pub mod error;
pub mod hash;
pub mod id;
pub mod state;
pub mod time;

pub use address::ChainAddress;
pub use error::TypesError;
pub use hash::TxHash;
pub use id::{ClaimId, UserId};
pub use state::{ClaimStatus, VerdictReason};
pub use time::{Clock, SystemClock, Timestamp};
