use std::time::Duration;

use thiserror::Error;

/// Failures talking to the chain node.
///
/// None of these say anything about the transaction itself; a missing
/// receipt is `Ok(None)`, not an error.
#[derive(Debug, Error)]
pub enum ChainError {
    #[error("chain node unreachable: {0}")]
    Unavailable(String),

    #[error("chain node rate limited the request")]
    RateLimited,

    #[error("HTTP status {0} from chain node")]
    Http(u16),

    #[error("JSON-RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("invalid response from chain node: {0}")]
    InvalidResponse(String),

    #[error("chain request timed out after {0} ms")]
    Timeout(u64),
}

impl ChainError {
    /// A request that ran out of its `after` time budget.
    pub fn timeout(after: Duration) -> Self {
        Self::Timeout(u64::try_from(after.as_millis()).unwrap_or(u64::MAX))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_reports_milliseconds() {
        let err = ChainError::timeout(Duration::from_millis(1500));
        assert!(matches!(err, ChainError::Timeout(1500)));
        assert_eq!(err.to_string(), "chain request timed out after 1500 ms");
    }
}
