use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};

use crate::api::AppState;

pub async fn health() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

/// Ready once the ledger database answers.
pub async fn ready(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    match sqlx::query("SELECT 1").execute(state.repo.pool()).await {
        Ok(_) => (
            StatusCode::OK,
            Json(json!({
                "status": "ready",
                "payoutRunning": state.payouts.is_running(),
            })),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({"status": "unavailable", "error": e.to_string()})),
            )
        }
    }
}
