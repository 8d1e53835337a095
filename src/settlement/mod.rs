//! Settlement client abstraction for executing on-chain batch transfers.

use crate::domain::{Decimal, SettlementTransfer};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

pub mod http;
pub mod mock;

pub use http::HttpSettlementClient;
pub use mock::MockSettlementClient;

/// Result of a submitted batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementReceipt {
    pub tx_id: String,
    pub block_ref: Option<String>,
}

/// Settlement client trait: one batch transfer per call.
///
/// Implementations must honour batch-id dedup: a batch id that was already
/// processed must never move funds a second time.
#[async_trait]
pub trait SettlementClient: Send + Sync + fmt::Debug {
    /// Submit one batch transfer and wait for confirmation.
    ///
    /// # Arguments
    /// * `batch_id` - Deterministic batch identifier
    /// * `transfers` - One transfer per destination wallet
    async fn submit_batch(
        &self,
        batch_id: &str,
        transfers: &[SettlementTransfer],
    ) -> Result<SettlementReceipt, SettlementError>;

    /// Whether the settlement side has already processed `batch_id`.
    async fn is_batch_processed(&self, batch_id: &str) -> Result<bool, SettlementError>;

    /// Balance available to the settlement contract.
    async fn balance(&self) -> Result<Decimal, SettlementError>;
}

/// Error type for settlement operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettlementError {
    /// Network error (e.g., connection timeout, DNS failure)
    NetworkError(String),
    /// HTTP error (e.g., 5xx from the gateway)
    HttpError { status: u16, message: String },
    /// Parsing error (invalid JSON or malformed response)
    ParseError(String),
    /// The batch id was already processed
    AlreadyProcessed(String),
    /// The contract cannot cover the batch
    InsufficientBalance { required: Decimal, available: Decimal },
    /// The gateway rejected the batch
    Rejected(String),
}

impl fmt::Display for SettlementError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettlementError::NetworkError(msg) => write!(f, "Network error: {}", msg),
            SettlementError::HttpError { status, message } => {
                write!(f, "HTTP error {}: {}", status, message)
            }
            SettlementError::ParseError(msg) => write!(f, "Parse error: {}", msg),
            SettlementError::AlreadyProcessed(batch_id) => {
                write!(f, "Batch already processed: {}", batch_id)
            }
            SettlementError::InsufficientBalance {
                required,
                available,
            } => write!(
                f,
                "Insufficient balance: required {}, available {}",
                required, available
            ),
            SettlementError::Rejected(msg) => write!(f, "Rejected: {}", msg),
        }
    }
}

impl std::error::Error for SettlementError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settlement_error_display() {
        let err = SettlementError::NetworkError("connection timeout".to_string());
        assert_eq!(err.to_string(), "Network error: connection timeout");

        let err = SettlementError::HttpError {
            status: 503,
            message: "Server error".to_string(),
        };
        assert_eq!(err.to_string(), "HTTP error 503: Server error");

        let err = SettlementError::InsufficientBalance {
            required: Decimal::from(10),
            available: Decimal::from(3),
        };
        assert_eq!(
            err.to_string(),
            "Insufficient balance: required 10, available 3"
        );

        let err = SettlementError::AlreadyProcessed("batch:1".to_string());
        assert_eq!(err.to_string(), "Batch already processed: batch:1");
    }
}
