//! The Tally node: owns storage, the deposit processor and background tasks.

use std::sync::Arc;
use std::time::Duration;

use tally_chain::{ChainClient, JsonRpcChainClient};
use tally_deposits::DepositProcessor;
use tally_rpc::{ApiState, DepositObserver, RpcServer};
use tally_store_lmdb::{check_integrity, IntegrityReport, LmdbEnvironment};
use tally_types::SystemClock;
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::metrics::DepositMetrics;
use crate::shutdown::ShutdownController;
use crate::sweeper::spawn_sweeper;
use crate::tracing_spans::{reconcile_span, rpc_span};
use crate::{NodeConfig, NodeError};

/// How long `stop` waits for background tasks before giving up on them.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

pub struct TallyNode {
    config: NodeConfig,
    environment: LmdbEnvironment,
    processor: Arc<DepositProcessor>,
    metrics: Option<Arc<DepositMetrics>>,
    shutdown: ShutdownController,
    task_handles: Vec<JoinHandle<()>>,
}

impl TallyNode {
    /// Open the LMDB environment under `config.data_dir` and connect the
    /// JSON-RPC chain client to `config.deposits.rpc_url`.
    pub fn new(config: NodeConfig) -> Result<Self, NodeError> {
        config.validate()?;
        let environment = LmdbEnvironment::open(&config.data_dir, config.map_size_bytes())?;
        let chain = JsonRpcChainClient::with_timeout(
            config.deposits.rpc_url.clone(),
            config.deposits.rpc_timeout(),
        )?;
        Self::with_chain(config, environment, Arc::new(chain))
    }

    /// Build around an already open environment and chain client.
    pub fn with_chain(
        config: NodeConfig,
        environment: LmdbEnvironment,
        chain: Arc<dyn ChainClient>,
    ) -> Result<Self, NodeError> {
        config.deposits.validate()?;
        let processor = Arc::new(DepositProcessor::new(
            &config.deposits,
            chain,
            Arc::new(environment.claim_store()),
            Arc::new(environment.ledger_store()),
            Arc::new(SystemClock),
        ));
        let metrics = config
            .enable_metrics
            .then(|| Arc::new(DepositMetrics::new()));

        Ok(Self {
            config,
            environment,
            processor,
            metrics,
            shutdown: ShutdownController::new(),
            task_handles: Vec::new(),
        })
    }

    pub fn processor(&self) -> &Arc<DepositProcessor> {
        &self.processor
    }

    pub fn metrics(&self) -> Option<&Arc<DepositMetrics>> {
        self.metrics.as_ref()
    }

    pub fn shutdown_controller(&self) -> &ShutdownController {
        &self.shutdown
    }

    /// Cross-check claims, indexes and ledger entries.
    pub fn check_integrity(&self) -> Result<IntegrityReport, NodeError> {
        let report = check_integrity(&self.environment)?;
        for error in &report.errors {
            tracing::error!(%error, "store integrity violation");
        }
        if !report.awaiting_credit.is_empty() {
            tracing::info!(
                count = report.awaiting_credit.len(),
                "verified claims awaiting credit"
            );
        }
        Ok(report)
    }

    /// Check the store, reconcile, then spawn the sweeper and the API
    /// server. Returns once everything is running.
    pub async fn start(&mut self) -> Result<(), NodeError> {
        tracing::info!(
            data_dir = %self.config.data_dir.display(),
            rpc_url = %self.config.deposits.rpc_url,
            deposit_address = %self.config.deposits.deposit_address,
            "Tally node starting"
        );

        let report = self.check_integrity()?;
        if !report.is_healthy() {
            return Err(NodeError::Integrity(format!(
                "{} problem(s), first: {}",
                report.errors.len(),
                report.errors.first().map(String::as_str).unwrap_or_default()
            )));
        }

        if self.config.reconcile_on_start {
            self.processor
                .reconcile()
                .instrument(reconcile_span())
                .await?;
        }
        if let Some(metrics) = &self.metrics {
            metrics.set_pending(self.processor.open_claims()?);
        }

        // ── Sweeper ──────────────────────────────────────────────────────
        if self.config.enable_sweeper {
            let handle = spawn_sweeper(
                Arc::clone(&self.processor),
                self.config.deposits.sweep_interval(),
                self.metrics.clone(),
                self.shutdown.subscribe(),
            );
            self.task_handles.push(handle);
        }

        // ── API server (optional) ────────────────────────────────────────
        if self.config.enable_api {
            let mut state = ApiState::new(Arc::clone(&self.processor));
            if let Some(metrics) = &self.metrics {
                let observer: Arc<dyn DepositObserver> = metrics.clone();
                state = state.with_metrics(metrics.registry.clone(), observer);
            }
            let api_server = RpcServer::with_state(self.config.api_port, Arc::new(state));
            let mut shutdown_rx_api = self.shutdown.subscribe();

            let api_handle = tokio::spawn(
                async move {
                    tokio::select! {
                        biased;
                        _ = shutdown_rx_api.recv() => {
                            tracing::info!("API server shutting down");
                        }
                        result = api_server.start() => {
                            match result {
                                Ok(()) => tracing::info!("API server exited"),
                                Err(e) => tracing::error!("API server error: {e}"),
                            }
                        }
                    }
                }
                .instrument(rpc_span("serve")),
            );
            self.task_handles.push(api_handle);
        }

        tracing::info!("Tally node started");
        Ok(())
    }

    /// Start, wait for SIGINT/SIGTERM, then stop.
    pub async fn run(&mut self) -> Result<(), NodeError> {
        self.start().await?;
        self.shutdown.wait_for_signal().await;
        self.stop().await
    }

    /// Stop the node gracefully.
    ///
    /// Signals every task, waits for them (bounded by a timeout) and flushes
    /// LMDB.
    pub async fn stop(&mut self) -> Result<(), NodeError> {
        tracing::info!("Tally node stopping");
        self.shutdown.shutdown();

        let handles: Vec<JoinHandle<()>> = self.task_handles.drain(..).collect();
        let wait_all = async {
            for handle in handles {
                let _ = handle.await;
            }
        };
        if tokio::time::timeout(SHUTDOWN_TIMEOUT, wait_all)
            .await
            .is_err()
        {
            tracing::warn!(
                "shutdown timeout ({:?}), some tasks may still be running",
                SHUTDOWN_TIMEOUT
            );
        }

        if let Err(e) = self.environment.force_sync() {
            tracing::warn!("LMDB force_sync failed: {e}");
        }

        tracing::info!("Tally node stopped");
        Ok(())
    }
}
