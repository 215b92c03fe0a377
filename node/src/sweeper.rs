//! Background sweep over claims whose backoff has elapsed.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tally_deposits::DepositProcessor;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::Instrument;

use crate::metrics::DepositMetrics;
use crate::tracing_spans::sweep_span;

/// Spawn the sweep loop. It runs one pass per `interval`, the first one
/// immediately, until `shutdown_rx` fires.
pub fn spawn_sweeper(
    processor: Arc<DepositProcessor>,
    interval: Duration,
    metrics: Option<Arc<DepositMetrics>>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // A slow pass delays the next one instead of bunching them up.
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut pass = 0u64;
        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => {
                    tracing::info!("sweeper shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    pass += 1;
                    run_pass(&processor, metrics.as_deref())
                        .instrument(sweep_span(pass))
                        .await;
                }
            }
        }
    })
}

async fn run_pass(processor: &DepositProcessor, metrics: Option<&DepositMetrics>) {
    let started = Instant::now();
    match processor.sweep().await {
        Ok(report) => {
            if let Some(metrics) = metrics {
                metrics.record_sweep(&report, started.elapsed());
            }
        }
        Err(e) => tracing::warn!(error = %e, "sweep pass failed"),
    }

    if let Some(metrics) = metrics {
        match processor.open_claims() {
            Ok(open) => metrics.set_pending(open),
            Err(e) => tracing::debug!(error = %e, "cannot count open claims"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ShutdownController;
    use alloy_primitives::{Address, U256};
    use rust_decimal::Decimal;
    use tally_deposits::{ClaimSubmission, DepositConfig};
    use tally_nullables::{transfer_log, NullChain, NullClaimStore, NullClock, NullLedger};
    use tally_types::{ChainAddress, ClaimStatus, TxHash, UserId};

    const TOKEN: [u8; 20] = [0x55; 20];
    const DEPOSIT: [u8; 20] = [0xde; 20];

    #[tokio::test]
    async fn sweeper_credits_pending_claims_and_stops_on_shutdown() {
        let config = DepositConfig {
            token_contract: ChainAddress::new(TOKEN),
            deposit_address: ChainAddress::new(DEPOSIT),
            ..Default::default()
        };
        let chain = Arc::new(NullChain::new(1012));
        let ledger = Arc::new(NullLedger::new());
        let processor = Arc::new(DepositProcessor::new(
            &config,
            chain.clone(),
            Arc::new(NullClaimStore::new()),
            ledger.clone(),
            Arc::new(NullClock::new(1_700_000_000)),
        ));

        let tx_hash = TxHash::new([0xab; 32]);
        let value = U256::from(100u64) * U256::from(10u64).pow(U256::from(18u64));
        chain.mine(
            tx_hash,
            1000,
            vec![transfer_log(
                Address::from(TOKEN),
                Address::repeat_byte(0x01),
                Address::from(DEPOSIT),
                value,
            )],
        );
        let claim = processor
            .submit_claim(ClaimSubmission {
                user_id: UserId::new("alice").unwrap(),
                tx_hash,
                claimed_amount: Decimal::ONE_HUNDRED,
                expected_recipient: None,
            })
            .unwrap();

        let metrics = Arc::new(DepositMetrics::new());
        let shutdown = ShutdownController::new();
        let handle = spawn_sweeper(
            Arc::clone(&processor),
            Duration::from_millis(20),
            Some(Arc::clone(&metrics)),
            shutdown.subscribe(),
        );

        for _ in 0..200 {
            if processor.claim(claim.id).unwrap().status == ClaimStatus::Credited {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(processor.claim(claim.id).unwrap().status, ClaimStatus::Credited);
        assert_eq!(ledger.applied_count(), 1);

        shutdown.shutdown();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("sweeper stops")
            .unwrap();
        assert!(metrics.sweeps.get() >= 1);
        assert_eq!(metrics.claims_credited.get(), 1);
        assert_eq!(metrics.claims_pending.get(), 0);
    }
}
