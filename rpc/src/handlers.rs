//! Request/response types and route handlers.
//!
//! Amounts, hashes and addresses travel as strings so clients never lose
//! precision to JSON numbers.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json},
};
use prometheus::{Encoder, TextEncoder};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tally_deposits::{Attempt, ClaimSubmission, VerificationVerdict};
use tally_store::{Balance, DepositClaim};
use tally_types::{ChainAddress, ClaimId, ClaimStatus, TxHash, UserId, VerdictReason};

use crate::error::RpcError;
use crate::server::ApiState;

// ── Claims ────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct SubmitClaimRequest {
    pub user_id: String,
    pub tx_hash: String,
    pub claimed_amount: String,
    #[serde(default)]
    pub expected_recipient: Option<String>,
}

impl SubmitClaimRequest {
    fn into_submission(self) -> Result<ClaimSubmission, RpcError> {
        let claimed_amount = Decimal::from_str(self.claimed_amount.trim()).map_err(|e| {
            RpcError::InvalidRequest(format!("claimed_amount {:?}: {e}", self.claimed_amount))
        })?;
        let expected_recipient = self
            .expected_recipient
            .as_deref()
            .map(ChainAddress::parse)
            .transpose()?;
        Ok(ClaimSubmission {
            user_id: UserId::new(self.user_id)?,
            tx_hash: TxHash::parse(&self.tx_hash)?,
            claimed_amount,
            expected_recipient,
        })
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClaimResponse {
    pub id: u64,
    pub user_id: String,
    pub tx_hash: String,
    pub claimed_amount: String,
    pub expected_recipient: String,
    pub status: ClaimStatus,
    pub rejection_reason: Option<VerdictReason>,
    /// Human-readable cause for a rejected claim.
    pub rejection_cause: Option<String>,
    pub last_reason: Option<VerdictReason>,
    pub attempts: u32,
    pub amount_on_chain: Option<String>,
    pub confirmations: u64,
    pub created_at: u64,
    pub last_checked_at: Option<u64>,
    pub credited_at: Option<u64>,
    pub failure: Option<String>,
}

impl From<&DepositClaim> for ClaimResponse {
    fn from(claim: &DepositClaim) -> Self {
        Self {
            id: claim.id.get(),
            user_id: claim.user_id.to_string(),
            tx_hash: claim.tx_hash.to_string(),
            claimed_amount: claim.claimed_amount.to_string(),
            expected_recipient: claim.expected_recipient.to_string(),
            status: claim.status,
            rejection_reason: claim.rejection_reason,
            rejection_cause: claim
                .rejection_reason
                .map(|reason| reason.description().to_string()),
            last_reason: claim.last_reason,
            attempts: claim.attempts,
            amount_on_chain: claim.amount_on_chain.map(|a| a.to_string()),
            confirmations: claim.confirmations,
            created_at: claim.created_at.as_secs(),
            last_checked_at: claim.last_checked_at.map(|t| t.as_secs()),
            credited_at: claim.credited_at.map(|t| t.as_secs()),
            failure: claim.failure.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct VerifyResponse {
    /// `checked`, `reconciled`, `settled` or `busy`.
    pub outcome: &'static str,
    pub claim: ClaimResponse,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verdict: Option<VerificationVerdict>,
}

impl From<&Attempt> for VerifyResponse {
    fn from(attempt: &Attempt) -> Self {
        let outcome = match attempt {
            Attempt::Checked { .. } => "checked",
            Attempt::Reconciled(_) => "reconciled",
            Attempt::Settled(_) => "settled",
            Attempt::Busy(_) => "busy",
        };
        Self {
            outcome,
            claim: ClaimResponse::from(attempt.claim()),
            verdict: attempt.verdict().cloned(),
        }
    }
}

fn parse_claim_id(raw: &str) -> Result<ClaimId, RpcError> {
    raw.parse::<u64>()
        .map(ClaimId::new)
        .map_err(|_| RpcError::InvalidRequest(format!("claim id {raw:?} is not a number")))
}

#[tracing::instrument(skip_all, name = "rpc", fields(action = "submit_claim"))]
pub async fn submit_claim(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<SubmitClaimRequest>,
) -> Result<(StatusCode, Json<ClaimResponse>), RpcError> {
    let submission = request.into_submission()?;
    let claim = state.processor.submit_claim(submission)?;
    if let Some(observer) = &state.observer {
        observer.claim_submitted(&claim);
    }
    Ok((StatusCode::CREATED, Json(ClaimResponse::from(&claim))))
}

#[tracing::instrument(skip_all, name = "rpc", fields(action = "get_claim"))]
pub async fn get_claim(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
) -> Result<Json<ClaimResponse>, RpcError> {
    let claim = state.processor.claim(parse_claim_id(&id)?)?;
    Ok(Json(ClaimResponse::from(&claim)))
}

#[tracing::instrument(skip_all, name = "rpc", fields(action = "verify_claim"))]
pub async fn verify_claim(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
) -> Result<Json<VerifyResponse>, RpcError> {
    let id = parse_claim_id(&id)?;
    let started = Instant::now();
    let result = state.processor.verify_claim(id).await;
    if let Some(observer) = &state.observer {
        match &result {
            Ok(attempt) => observer.attempt_finished(attempt, started.elapsed()),
            Err(_) => observer.attempt_errored(),
        }
    }
    Ok(Json(VerifyResponse::from(&result?)))
}

// ── Balances ──────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct BalanceResponse {
    pub user_id: String,
    pub balance: String,
    pub total_earned: String,
}

impl BalanceResponse {
    fn new(user_id: &UserId, balance: &Balance) -> Self {
        Self {
            user_id: user_id.to_string(),
            balance: balance.balance.to_string(),
            total_earned: balance.total_earned.to_string(),
        }
    }
}

#[tracing::instrument(skip_all, name = "rpc", fields(action = "get_balance"))]
pub async fn get_balance(
    State(state): State<Arc<ApiState>>,
    Path(user_id): Path<String>,
) -> Result<Json<BalanceResponse>, RpcError> {
    let user_id = UserId::new(user_id)?;
    let balance = state.processor.balance(&user_id)?;
    Ok(Json(BalanceResponse::new(&user_id, &balance)))
}

// ── Metrics ───────────────────────────────────────────────────────────────

pub async fn metrics(State(state): State<Arc<ApiState>>) -> Result<impl IntoResponse, RpcError> {
    let registry = state
        .metrics_registry
        .as_ref()
        .ok_or(RpcError::MetricsDisabled)?;
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder
        .encode(&registry.gather(), &mut buffer)
        .map_err(|e| RpcError::Server(format!("encode metrics: {e}")))?;
    Ok((
        [(header::CONTENT_TYPE, encoder.format_type().to_string())],
        buffer,
    ))
}
