use tally_types::ClaimStatus;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("key not found: {0}")]
    NotFound(String),

    #[error("claim {id} changed concurrently: expected {expected}, found {actual}")]
    Conflict {
        id: String,
        expected: ClaimStatus,
        actual: ClaimStatus,
    },

    #[error("arithmetic overflow: {0}")]
    Overflow(String),

    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("database is corrupted: {0}")]
    Corruption(String),
}

impl StoreError {
    /// Whether the error means the stored data can no longer be trusted.
    pub fn is_corruption(&self) -> bool {
        matches!(self, Self::Corruption(_) | Self::Serialization(_))
    }
}
