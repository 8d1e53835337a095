use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use std::str::FromStr;

use crate::api::AppState;
use crate::domain::{AuditAction, Decimal, Tier, TierConfig};
use crate::error::AppError;

/// Update body; the tier comes from the path.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TierConfigUpdate {
    pub direct_rate: Decimal,
    pub group_rate: Decimal,
    pub management_rate_f1: Decimal,
    pub management_rate_f2: Decimal,
    pub management_rate_f3: Decimal,
    pub package_value: Decimal,
    pub reconsumption_threshold: Decimal,
    pub reconsumption_required: Decimal,
}

fn paid_tier(raw: &str) -> Result<Tier, AppError> {
    let tier = Tier::from_str(raw).map_err(|e| AppError::BadRequest(e.to_string()))?;
    if !tier.is_active() {
        return Err(AppError::BadRequest("tier none has no config".into()));
    }
    Ok(tier)
}

pub async fn get_tier_config(
    Path(tier): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<TierConfig>, AppError> {
    let tier = paid_tier(&tier)?;
    Ok(Json(state.configs.get(tier).await?))
}

pub async fn put_tier_config(
    Path(tier): Path<String>,
    State(state): State<AppState>,
    Json(body): Json<TierConfigUpdate>,
) -> Result<Json<TierConfig>, AppError> {
    let tier = paid_tier(&tier)?;
    let config = TierConfig {
        tier,
        direct_rate: body.direct_rate,
        group_rate: body.group_rate,
        management_rate_f1: body.management_rate_f1,
        management_rate_f2: body.management_rate_f2,
        management_rate_f3: body.management_rate_f3,
        package_value: body.package_value,
        reconsumption_threshold: body.reconsumption_threshold,
        reconsumption_required: body.reconsumption_required,
    };
    config.validate().map_err(AppError::BadRequest)?;

    let previous = state.configs.get(tier).await?;
    state.configs.update(&config).await?;
    state
        .payouts
        .audit()
        .record(
            None,
            AuditAction::ConfigUpdated,
            &format!("Commission config for {} updated", tier),
            json!({ "previous": previous, "current": config }),
        )
        .await;
    tracing::info!(tier = %tier, "Commission config updated");

    Ok(Json(config))
}
