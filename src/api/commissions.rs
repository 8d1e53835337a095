use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::api::AppState;
use crate::domain::{Commission, CommissionId, Decimal, MemberId, OrderId};
use crate::error::AppError;

const DEFAULT_PENDING_LIMIT: i64 = 100;
const MAX_PENDING_LIMIT: i64 = 1_000;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingQuery {
    pub limit: Option<i64>,
    pub min_amount: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommissionsQuery {
    pub order_id: Option<i64>,
    pub beneficiary_id: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommissionsResponse {
    pub count: usize,
    pub total_amount: String,
    pub commissions: Vec<Commission>,
}

impl CommissionsResponse {
    fn from_rows(commissions: Vec<Commission>) -> Self {
        let total: Decimal = commissions.iter().map(|c| c.amount).sum();
        Self {
            count: commissions.len(),
            total_amount: total.to_canonical_string(),
            commissions,
        }
    }
}

pub async fn pending_commissions(
    Query(params): Query<PendingQuery>,
    State(state): State<AppState>,
) -> Result<Json<CommissionsResponse>, AppError> {
    let limit = params.limit.unwrap_or(DEFAULT_PENDING_LIMIT);
    if !(1..=MAX_PENDING_LIMIT).contains(&limit) {
        return Err(AppError::BadRequest(format!(
            "limit must be between 1 and {}",
            MAX_PENDING_LIMIT
        )));
    }
    let rows = state
        .payouts
        .pending_commissions(limit, params.min_amount)
        .await?;
    Ok(Json(CommissionsResponse::from_rows(rows)))
}

pub async fn list_commissions(
    Query(params): Query<CommissionsQuery>,
    State(state): State<AppState>,
) -> Result<Json<CommissionsResponse>, AppError> {
    let rows = match (params.order_id, params.beneficiary_id) {
        (Some(order_id), None) => state.repo.commissions_for_order(OrderId(order_id)).await?,
        (None, Some(member_id)) => {
            state
                .repo
                .commissions_for_beneficiary(MemberId(member_id))
                .await?
        }
        (Some(order_id), Some(member_id)) => state
            .repo
            .commissions_for_order(OrderId(order_id))
            .await?
            .into_iter()
            .filter(|c| c.beneficiary_id == MemberId(member_id))
            .collect(),
        (None, None) => {
            return Err(AppError::BadRequest(
                "orderId or beneficiaryId is required".into(),
            ))
        }
    };
    Ok(Json(CommissionsResponse::from_rows(rows)))
}

pub async fn approve_commission(
    Path(id): Path<i64>,
    State(state): State<AppState>,
) -> Result<Json<Commission>, AppError> {
    let commission_id = CommissionId(id);
    if let Some(approved) = state.payouts.approve(commission_id).await? {
        return Ok(Json(approved));
    }
    match state.repo.get_commission(commission_id).await? {
        Some(_) => Err(AppError::Conflict(format!("commission {} is already paid", id))),
        None => Err(AppError::NotFound(format!("commission {}", id))),
    }
}
