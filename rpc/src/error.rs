//! API error types and their HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use tally_deposits::DepositError;
use tally_store::StoreError;
use tally_types::{ClaimId, TypesError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("claim not found: {0}")]
    ClaimNotFound(ClaimId),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("claim changed concurrently: {0}")]
    Conflict(String),

    #[error("metrics are disabled")]
    MetricsDisabled,

    #[error("store error: {0}")]
    Store(String),

    #[error("server error: {0}")]
    Server(String),
}

impl RpcError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::ClaimNotFound(_) | Self::MetricsDisabled => StatusCode::NOT_FOUND,
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Store(_) | Self::Server(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<DepositError> for RpcError {
    fn from(e: DepositError) -> Self {
        match e {
            DepositError::ClaimNotFound(id) => RpcError::ClaimNotFound(id),
            DepositError::InvalidAmount(_)
            | DepositError::UnexpectedRecipient { .. }
            | DepositError::Config(_) => RpcError::InvalidRequest(e.to_string()),
            DepositError::Transition(_) => RpcError::Conflict(e.to_string()),
            DepositError::LedgerMismatch { .. } => RpcError::Server(e.to_string()),
            DepositError::Store(store) => store.into(),
        }
    }
}

impl From<StoreError> for RpcError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Conflict { .. } => RpcError::Conflict(e.to_string()),
            other => RpcError::Store(other.to_string()),
        }
    }
}

impl From<TypesError> for RpcError {
    fn from(e: TypesError) -> Self {
        RpcError::InvalidRequest(e.to_string())
    }
}

impl IntoResponse for RpcError {
    fn into_response(self) -> Response {
        let status = self.status();
        // Internal details stay in the log.
        let message = if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
            "internal server error".to_string()
        } else {
            self.to_string()
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_types::ClaimStatus;

    #[test]
    fn deposit_errors_map_to_status_codes() {
        let cases = [
            (
                RpcError::from(DepositError::ClaimNotFound(ClaimId::new(7))),
                StatusCode::NOT_FOUND,
            ),
            (
                RpcError::from(DepositError::InvalidAmount("-1".into())),
                StatusCode::BAD_REQUEST,
            ),
            (
                RpcError::from(DepositError::Store(StoreError::Conflict {
                    id: "7".into(),
                    expected: ClaimStatus::Pending,
                    actual: ClaimStatus::Verifying,
                })),
                StatusCode::CONFLICT,
            ),
            (
                RpcError::from(DepositError::Store(StoreError::Backend("disk".into()))),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (error, status) in cases {
            assert_eq!(error.status(), status, "{error}");
        }
    }

    #[test]
    fn server_errors_hide_details() {
        let response = RpcError::Store("secret path".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
