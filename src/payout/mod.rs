//! Commission settlement: wallet batching, atomic execution and audit.

use crate::db::StatusTotals;
use crate::domain::{CommissionId, Decimal};
use crate::settlement::SettlementError;
use serde::Serialize;
use thiserror::Error;

pub mod audit;
pub mod batcher;

pub use audit::{to_csv, AuditTrail};
pub use batcher::PayoutBatcher;

/// A settled batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReceipt {
    pub batch_id: String,
    /// None for a reconciled batch: the settlement side had already
    /// processed it and no receipt came back.
    pub tx_id: Option<String>,
    pub block_ref: Option<String>,
    /// Marked paid from the settlement side's record, without a transfer.
    pub reconciled: bool,
    pub wallets: usize,
    pub commission_ids: Vec<CommissionId>,
    pub total_amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PayoutOutcome {
    Settled(BatchReceipt),
    /// No pending commission with a payout address.
    NothingToPay,
    /// Another payout holds the single-sweep slot.
    Busy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PayoutStats {
    pub totals: Vec<StatusTotals>,
    pub batches_executed: i64,
    pub batches_failed: i64,
    pub settlement_balance: Option<Decimal>,
    pub payout_running: bool,
}

#[derive(Debug, Error)]
pub enum PayoutError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("settlement failed: {0}")]
    Settlement(#[from] SettlementError),

    #[error("no pending commissions left in batch")]
    NothingPending,

    #[error("batch {0} changed while it was being reserved")]
    StaleBatch(String),

    #[error("insufficient settlement balance: required {required}, available {available}")]
    InsufficientBalance { required: Decimal, available: Decimal },

    /// Funds moved but the local ledger did not record it. The next payout
    /// reconciles the batch through its id.
    #[error("batch {batch_id} settled but commit failed: {source}")]
    CommitAfterSettlement {
        batch_id: String,
        tx_id: Option<String>,
        #[source]
        source: sqlx::Error,
    },
}

impl PayoutError {
    /// Whether funds may have moved even though the batch did not complete.
    pub fn outcome_unknown(&self) -> bool {
        matches!(
            self,
            PayoutError::CommitAfterSettlement { .. }
                | PayoutError::Settlement(
                    SettlementError::NetworkError(_)
                        | SettlementError::HttpError { .. }
                        | SettlementError::ParseError(_)
                )
        )
    }
}
