use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::api::AppState;
use crate::domain::{CommissionId, Decimal, OrderId};
use crate::error::AppError;
use crate::orchestration::QueueStats;
use crate::payout::{PayoutOutcome, PayoutStats};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    #[serde(flatten)]
    pub payouts: PayoutStats,
    pub jobs: QueueStats,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManualBatchRequest {
    pub commission_ids: Vec<CommissionId>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoPayoutRequest {
    pub batch_size: Option<i64>,
    pub min_amount: Option<Decimal>,
}

pub async fn payout_stats(State(state): State<AppState>) -> Result<Json<StatsResponse>, AppError> {
    let payouts = state.payouts.stats().await?;
    Ok(Json(StatsResponse {
        payouts,
        jobs: state.queue.stats(),
    }))
}

pub async fn manual_batch(
    State(state): State<AppState>,
    Json(body): Json<ManualBatchRequest>,
) -> Result<Json<PayoutOutcome>, AppError> {
    if body.commission_ids.is_empty() {
        return Err(AppError::BadRequest("commissionIds must not be empty".into()));
    }
    Ok(Json(
        state
            .payouts
            .settle_commissions(&body.commission_ids)
            .await?,
    ))
}

pub async fn auto_payout(
    State(state): State<AppState>,
    body: Option<Json<AutoPayoutRequest>>,
) -> Result<Json<PayoutOutcome>, AppError> {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let batch_size = body
        .batch_size
        .unwrap_or(state.config.auto_payout_batch_size);
    if batch_size <= 0 {
        return Err(AppError::BadRequest("batchSize must be positive".into()));
    }
    let min_amount = body.min_amount.or(state.config.auto_payout_min_amount);

    Ok(Json(state.payouts.auto_payout(batch_size, min_amount).await?))
}

pub async fn order_payout(
    Path(id): Path<i64>,
    State(state): State<AppState>,
) -> Result<Json<PayoutOutcome>, AppError> {
    Ok(Json(state.payouts.payout_for_order(OrderId(id)).await?))
}
