//! Axum-based API server.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    routing::{get, post},
    Router,
};
use prometheus::Registry;
use tally_deposits::{Attempt, DepositProcessor};
use tally_store::DepositClaim;
use tokio::net::TcpListener;
use tracing::info;

use crate::error::RpcError;
use crate::handlers;

/// Hook the node implements so the API can feed its metrics without this
/// crate depending on the node.
pub trait DepositObserver: Send + Sync {
    fn claim_submitted(&self, claim: &DepositClaim);
    fn attempt_finished(&self, attempt: &Attempt, elapsed: Duration);
    fn attempt_errored(&self);
}

/// Shared state handed to every handler.
pub struct ApiState {
    pub processor: Arc<DepositProcessor>,
    /// `None` disables `/metrics`.
    pub metrics_registry: Option<Registry>,
    pub observer: Option<Arc<dyn DepositObserver>>,
}

impl ApiState {
    pub fn new(processor: Arc<DepositProcessor>) -> Self {
        Self {
            processor,
            metrics_registry: None,
            observer: None,
        }
    }

    pub fn with_metrics(mut self, registry: Registry, observer: Arc<dyn DepositObserver>) -> Self {
        self.metrics_registry = Some(registry);
        self.observer = Some(observer);
        self
    }
}

/// All routes, bound to `state`.
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/claims", post(handlers::submit_claim))
        .route("/claims/:id", get(handlers::get_claim))
        .route("/claims/:id/verify", post(handlers::verify_claim))
        .route("/balances/:user_id", get(handlers::get_balance))
        .route("/metrics", get(handlers::metrics))
        .with_state(state)
}

pub struct RpcServer {
    pub port: u16,
    pub state: Arc<ApiState>,
}

impl RpcServer {
    pub fn with_state(port: u16, state: Arc<ApiState>) -> Self {
        Self { port, state }
    }

    /// Bind `0.0.0.0:{port}` and serve until the task is dropped.
    pub async fn start(&self) -> Result<(), RpcError> {
        let addr = format!("0.0.0.0:{}", self.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| RpcError::Server(format!("bind {addr}: {e}")))?;
        info!("API server listening on {}", addr);
        self.serve(listener).await
    }

    /// Serve on an already bound listener.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), RpcError> {
        axum::serve(listener, router(Arc::clone(&self.state)))
            .await
            .map_err(|e| RpcError::Server(e.to_string()))
    }
}
