use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use crate::api::AppState;
use crate::domain::{Decimal, MemberId, Order, OrderId, OrderStatus};
use crate::engine::ProcessOutcome;
use crate::error::AppError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordOrderRequest {
    pub id: OrderId,
    pub buyer_id: MemberId,
    pub amount: Decimal,
    #[serde(default)]
    pub status: Option<OrderStatus>,
}

pub async fn record_order(
    State(state): State<AppState>,
    Json(body): Json<RecordOrderRequest>,
) -> Result<(StatusCode, Json<Order>), AppError> {
    if !body.amount.is_positive() {
        return Err(AppError::BadRequest("amount must be positive".into()));
    }
    if state.repo.get_member(body.buyer_id).await?.is_none() {
        return Err(AppError::BadRequest(format!("unknown buyer {}", body.buyer_id)));
    }

    let status = body.status.unwrap_or(OrderStatus::Pending);
    if !state
        .repo
        .insert_order(body.id, body.buyer_id, body.amount.to_money(), status)
        .await?
    {
        return Err(AppError::Conflict(format!("order {} already exists", body.id)));
    }

    let order = state
        .repo
        .get_order(body.id)
        .await?
        .ok_or_else(|| AppError::Internal("order vanished after insert".into()))?;
    Ok((StatusCode::CREATED, Json(order)))
}

/// Order subsystem reports an order as confirmed.
///
/// The order is marked confirmed and its commissions computed. Commission
/// problems are reported in the body with a 200 so the caller never treats
/// them as a failed confirmation.
pub async fn order_confirmed(
    Path(id): Path<i64>,
    State(state): State<AppState>,
) -> Result<Json<ProcessOutcome>, AppError> {
    let order_id = OrderId(id);
    let order = state
        .repo
        .get_order(order_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("order {}", id)))?;
    if order.status == OrderStatus::Cancelled {
        return Err(AppError::Conflict(format!("order {} is cancelled", id)));
    }
    if order.status == OrderStatus::Pending {
        state
            .repo
            .set_order_status(order_id, OrderStatus::Confirmed)
            .await?;
    }

    Ok(Json(state.pipeline.on_order_confirmed(order_id).await))
}
