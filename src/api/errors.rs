//! API Error Handling
//!
//! Structured error responses with proper HTTP status codes and request tracking.

use crate::errors::{LedgerError, RoundError};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Top-level API error response with request tracking
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub request_id: String,
    pub error: ErrorBody,
}

/// Error body with structured information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Stable machine-readable code (INSUFFICIENT_FUNDS, ROUND_CLOSED, ...)
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// API error types with request tracking
#[derive(Debug)]
pub struct ApiError {
    pub kind: ApiErrorKind,
    pub code: &'static str,
    pub request_id: String,
    pub details: Option<serde_json::Value>,
}

#[derive(Debug)]
pub enum ApiErrorKind {
    NotFound(String),
    BadRequest(String),
    Unauthorized(String),
    PaymentRequired(String),
    Conflict(String),
    InternalError(String),
    ServiceUnavailable(String),
}

impl ApiError {
    fn new(request_id: String, code: &'static str, kind: ApiErrorKind) -> Self {
        Self {
            kind,
            code,
            request_id,
            details: None,
        }
    }

    pub fn bad_request(request_id: String, message: String) -> Self {
        Self::new(request_id, "BAD_REQUEST", ApiErrorKind::BadRequest(message))
    }

    pub fn unauthorized(request_id: String, message: String) -> Self {
        Self::new(request_id, "UNAUTHORIZED", ApiErrorKind::Unauthorized(message))
    }

    pub fn internal_error(request_id: String, message: String) -> Self {
        Self::new(request_id, "INTERNAL_ERROR", ApiErrorKind::InternalError(message))
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn from_ledger(request_id: String, err: LedgerError) -> Self {
        let message = err.to_string();
        let (code, kind) = match &err {
            LedgerError::InsufficientFunds { .. } => ("INSUFFICIENT_FUNDS", ApiErrorKind::PaymentRequired(message)),
            LedgerError::BelowMinimum { .. } => ("BELOW_MINIMUM", ApiErrorKind::BadRequest(message)),
            LedgerError::AlreadyPaid(_) => ("ALREADY_PAID", ApiErrorKind::Conflict(message)),
            LedgerError::AlreadySettled(_) => ("ALREADY_SETTLED", ApiErrorKind::Conflict(message)),
            LedgerError::WalletNotFound(_) => ("WALLET_NOT_FOUND", ApiErrorKind::NotFound(message)),
            LedgerError::WalletExists(_) => ("WALLET_EXISTS", ApiErrorKind::Conflict(message)),
            LedgerError::WithdrawalNotFound(_) => ("WITHDRAWAL_NOT_FOUND", ApiErrorKind::NotFound(message)),
            LedgerError::InvalidPhone(_) => ("INVALID_PHONE", ApiErrorKind::BadRequest(message)),
            LedgerError::Storage(_) => ("STORAGE_UNAVAILABLE", ApiErrorKind::ServiceUnavailable(message)),
            LedgerError::Corrupted(_) => ("INTERNAL_ERROR", ApiErrorKind::InternalError(message)),
        };
        let mut api_error = Self::new(request_id, code, kind);
        if let LedgerError::InsufficientFunds { required, available } = err {
            api_error = api_error.with_details(serde_json::json!({
                "required": required,
                "available": available,
            }));
        }
        api_error
    }

    pub fn from_round(request_id: String, err: RoundError) -> Self {
        let message = err.to_string();
        let (code, kind) = match err {
            RoundError::Ledger(inner) => return Self::from_ledger(request_id, inner),
            RoundError::NotVerified(_) => ("NOT_VERIFIED", ApiErrorKind::Conflict(message)),
            RoundError::NotSeated(_) => ("NOT_SEATED", ApiErrorKind::NotFound(message)),
            RoundError::AlreadySeated { .. } => ("ALREADY_SEATED", ApiErrorKind::Conflict(message)),
            RoundError::AlreadyVerified(_) => ("ALREADY_VERIFIED", ApiErrorKind::Conflict(message)),
            RoundError::UnknownStakeTier(_) => ("UNKNOWN_STAKE_TIER", ApiErrorKind::BadRequest(message)),
            RoundError::UnknownCard(_) => ("UNKNOWN_CARD", ApiErrorKind::BadRequest(message)),
            RoundError::CellOutOfRange(_) => ("CELL_OUT_OF_RANGE", ApiErrorKind::BadRequest(message)),
            RoundError::NumberNotCalled(_) => ("NUMBER_NOT_CALLED", ApiErrorKind::Conflict(message)),
            RoundError::FreeCellLocked => ("FREE_CELL_LOCKED", ApiErrorKind::Conflict(message)),
            RoundError::NotInProgress => ("NOT_IN_PROGRESS", ApiErrorKind::Conflict(message)),
            RoundError::RoundClosed => ("ROUND_CLOSED", ApiErrorKind::Conflict(message)),
            RoundError::TableFull => ("TABLE_FULL", ApiErrorKind::Conflict(message)),
            RoundError::TableNotFound(_) => ("TABLE_NOT_FOUND", ApiErrorKind::NotFound(message)),
            RoundError::TableUnavailable(_) => ("TABLE_UNAVAILABLE", ApiErrorKind::ServiceUnavailable(message)),
            RoundError::SettlementPending(_) => ("SETTLEMENT_PENDING", ApiErrorKind::Conflict(message)),
        };
        Self::new(request_id, code, kind)
    }

    fn status_and_message(&self) -> (StatusCode, &str) {
        match &self.kind {
            ApiErrorKind::NotFound(msg) => (StatusCode::NOT_FOUND, msg.as_str()),
            ApiErrorKind::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.as_str()),
            ApiErrorKind::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg.as_str()),
            ApiErrorKind::PaymentRequired(msg) => (StatusCode::PAYMENT_REQUIRED, msg.as_str()),
            ApiErrorKind::Conflict(msg) => (StatusCode::CONFLICT, msg.as_str()),
            ApiErrorKind::InternalError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.as_str()),
            ApiErrorKind::ServiceUnavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg.as_str()),
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (status, message) = self.status_and_message();
        write!(f, "[{}] {} {}: {}", self.request_id, status.as_u16(), self.code, message)
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = self.status_and_message();
        let body = Json(ErrorResponse {
            request_id: self.request_id.clone(),
            error: ErrorBody {
                code: self.code.to_string(),
                message: message.to_string(),
                details: self.details.clone(),
            },
        });

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::types::Money;

    #[test]
    fn test_insufficient_funds_maps_to_402_with_details() {
        let err = ApiError::from_round(
            "req-1".to_string(),
            RoundError::Ledger(LedgerError::InsufficientFunds {
                required: Money::whole(10),
                available: Money::whole(5),
            }),
        );
        assert_eq!(err.code, "INSUFFICIENT_FUNDS");
        assert_eq!(err.status_and_message().0, StatusCode::PAYMENT_REQUIRED);
        assert_eq!(err.details.as_ref().unwrap()["required"], 1000);
    }

    #[test]
    fn test_round_closed_is_conflict() {
        let err = ApiError::from_round("req-2".to_string(), RoundError::RoundClosed);
        assert_eq!(err.status_and_message().0, StatusCode::CONFLICT);
        assert!(err.to_string().contains("ROUND_CLOSED"));
    }

    #[test]
    fn test_pending_settlement_is_conflict() {
        let round_id = crate::ledger::types::RoundId::new();
        let err = ApiError::from_round("req-3".to_string(), RoundError::SettlementPending(round_id));
        assert_eq!(err.code, "SETTLEMENT_PENDING");
        assert_eq!(err.status_and_message().0, StatusCode::CONFLICT);
    }
}
