use crate::engine::CommissionError;
use crate::payout::PayoutError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Internal server error: {0}")]
    Internal(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Settlement gateway error: {0}")]
    Upstream(String),
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<CommissionError> for AppError {
    fn from(err: CommissionError) -> Self {
        match err {
            CommissionError::MemberNotFound(id) => AppError::NotFound(format!("member {}", id)),
            CommissionError::Database(e) => AppError::Internal(e.to_string()),
        }
    }
}

impl From<PayoutError> for AppError {
    fn from(err: PayoutError) -> Self {
        match err {
            PayoutError::NothingPending | PayoutError::StaleBatch(_) => {
                AppError::Conflict(err.to_string())
            }
            PayoutError::Settlement(_) | PayoutError::InsufficientBalance { .. } => {
                AppError::Upstream(err.to_string())
            }
            PayoutError::Database(_) | PayoutError::CommitAfterSettlement { .. } => {
                AppError::Internal(err.to_string())
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::Upstream(msg) => (StatusCode::BAD_GATEWAY, msg),
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}
