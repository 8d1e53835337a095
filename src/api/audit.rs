use axum::extract::{Query, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::api::AppState;
use crate::domain::{AuditEntry, AuditFilter, TimeMs};
use crate::error::AppError;
use crate::payout::to_csv;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditQuery {
    pub batch_id: Option<String>,
    pub from_ms: Option<i64>,
    pub to_ms: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditResponse {
    pub count: usize,
    pub entries: Vec<AuditEntry>,
}

fn filter_from(params: AuditQuery) -> Result<AuditFilter, AppError> {
    let from_ms = params.from_ms.map(TimeMs::new);
    let to_ms = params.to_ms.map(TimeMs::new);
    if let (Some(from_ms), Some(to_ms)) = (from_ms, to_ms) {
        if from_ms > to_ms {
            return Err(AppError::BadRequest("fromMs must be <= toMs".into()));
        }
    }
    Ok(AuditFilter {
        batch_id: params.batch_id.filter(|b| !b.is_empty()),
        from_ms,
        to_ms,
    })
}

pub async fn get_audit(
    Query(params): Query<AuditQuery>,
    State(state): State<AppState>,
) -> Result<Json<AuditResponse>, AppError> {
    let filter = filter_from(params)?;
    let entries = state.payouts.audit().entries(&filter).await?;
    Ok(Json(AuditResponse {
        count: entries.len(),
        entries,
    }))
}

pub async fn export_audit(
    Query(params): Query<AuditQuery>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let filter = filter_from(params)?;
    let entries = state.payouts.audit().entries(&filter).await?;
    let body = to_csv(&entries).map_err(|e| AppError::Internal(format!("CSV export failed: {}", e)))?;

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"audit_log.csv\"",
            ),
        ],
        body,
    ))
}
