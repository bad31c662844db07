use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::error;

use crate::ledger::LedgerError;
use crate::store::StoreError;

pub const E_INVALID_INIT_DATA: &str = "INVALID_INIT_DATA";
pub const E_MISSING_USER_ID: &str = "MISSING_USER_ID";
pub const E_MISSING_UID: &str = "MISSING_UID";
pub const E_PROFILE_NOT_FOUND: &str = "PROFILE_NOT_FOUND";
pub const E_USER_NOT_FOUND: &str = "USER_NOT_FOUND";
pub const E_DAILY_LIMIT_REACHED: &str = "DAILY_LIMIT_REACHED";
pub const E_MISSING_FIELDS: &str = "MISSING_FIELDS";
pub const E_MIN_WITHDRAW_NOT_MET: &str = "MIN_WITHDRAW_NOT_MET";
pub const E_INSUFFICIENT_BALANCE: &str = "INSUFFICIENT_BALANCE";
pub const E_MISSING_ADMIN: &str = "MISSING_ADMIN";
pub const E_NOT_ADMIN: &str = "NOT_ADMIN";
pub const E_REQUEST_NOT_FOUND: &str = "REQUEST_NOT_FOUND";
pub const E_ALREADY_DECIDED: &str = "ALREADY_DECIDED";
pub const E_SERVER_ERROR: &str = "SERVER_ERROR";

/// Wire-level error: a status and a stable code rendered as
/// `{"ok": false, "error": CODE}`.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(&'static str),
    Forbidden(&'static str),
    NotFound(&'static str),
    Conflict(&'static str),
    Internal(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ApiError::BadRequest(code) => (StatusCode::BAD_REQUEST, *code),
            ApiError::Forbidden(code) => (StatusCode::FORBIDDEN, *code),
            ApiError::NotFound(code) => (StatusCode::NOT_FOUND, *code),
            ApiError::Conflict(code) => (StatusCode::CONFLICT, *code),
            ApiError::Internal(e) => {
                error!("internal error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, E_SERVER_ERROR)
            }
        };

        (status, Json(json!({ "ok": false, "error": code }))).into_response()
    }
}

impl From<LedgerError> for ApiError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::UserNotFound(_) => ApiError::BadRequest(E_USER_NOT_FOUND),
            LedgerError::DailyLimitReached => ApiError::Conflict(E_DAILY_LIMIT_REACHED),
            LedgerError::InsufficientBalance => ApiError::BadRequest(E_INSUFFICIENT_BALANCE),
            LedgerError::MinimumNotMet => ApiError::BadRequest(E_MIN_WITHDRAW_NOT_MET),
            LedgerError::RequestNotFound => ApiError::BadRequest(E_REQUEST_NOT_FOUND),
            LedgerError::AlreadyDecided => ApiError::BadRequest(E_ALREADY_DECIDED),
            LedgerError::NotAdmin => ApiError::Forbidden(E_NOT_ADMIN),
            LedgerError::Store(e) => ApiError::Internal(e.into()),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        ApiError::Internal(e.into())
    }
}
