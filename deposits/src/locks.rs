//! Per-claim exclusive locks keyed by transaction hash.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tally_types::TxHash;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Held while a claim is read, checked on chain and written back.
///
/// Released on drop, on every exit path.
pub struct ClaimGuard {
    _guard: OwnedMutexGuard<()>,
}

/// Registry of per-transaction locks.
///
/// Entries nobody holds or waits on are pruned whenever a new lock is
/// handed out, so the map stays proportional to in-flight work.
#[derive(Default)]
pub struct ClaimLocks {
    inner: Mutex<HashMap<TxHash, Arc<AsyncMutex<()>>>>,
}

impl ClaimLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, tx_hash: &TxHash) -> Arc<AsyncMutex<()>> {
        let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        map.retain(|hash, lock| hash == tx_hash || Arc::strong_count(lock) > 1);
        Arc::clone(map.entry(*tx_hash).or_default())
    }

    /// Wait for exclusive access to the claim on `tx_hash`.
    pub async fn lock(&self, tx_hash: &TxHash) -> ClaimGuard {
        ClaimGuard {
            _guard: self.entry(tx_hash).lock_owned().await,
        }
    }

    /// Exclusive access if nobody else holds it right now.
    pub fn try_lock(&self, tx_hash: &TxHash) -> Option<ClaimGuard> {
        self.entry(tx_hash)
            .try_lock_owned()
            .ok()
            .map(|guard| ClaimGuard { _guard: guard })
    }

    /// Number of tracked locks.
    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn second_holder_waits() {
        let locks = Arc::new(ClaimLocks::new());
        let hash = TxHash::new([1; 32]);

        let guard = locks.lock(&hash).await;
        assert!(locks.try_lock(&hash).is_none());

        let waiter = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move {
                let _g = locks.lock(&hash).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        waiter.await.unwrap();
        assert!(locks.try_lock(&hash).is_some());
    }

    #[tokio::test]
    async fn different_claims_do_not_block() {
        let locks = ClaimLocks::new();
        let _a = locks.lock(&TxHash::new([1; 32])).await;
        assert!(locks.try_lock(&TxHash::new([2; 32])).is_some());
    }

    #[tokio::test]
    async fn released_entries_are_pruned() {
        let locks = ClaimLocks::new();
        for byte in 0..10u8 {
            let _g = locks.lock(&TxHash::new([byte; 32])).await;
        }
        let _last = locks.lock(&TxHash::new([0xff; 32])).await;
        assert_eq!(locks.len(), 1);
    }
}
