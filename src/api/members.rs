use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use crate::api::AppState;
use crate::domain::{LegSide, Member, MemberId, NewMember, UserMilestone};
use crate::engine::{MilestoneOutcome, TreeNavigator};
use crate::error::AppError;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberResponse {
    #[serde(flatten)]
    pub member: Member,
    pub suspended: bool,
    pub eligible: bool,
    pub milestones: Vec<UserMilestone>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SideResponse {
    pub member_id: MemberId,
    pub ancestor_id: MemberId,
    pub side: LegSide,
}

pub async fn register_member(
    State(state): State<AppState>,
    Json(body): Json<NewMember>,
) -> Result<(StatusCode, Json<Member>), AppError> {
    if body.parent_id.is_some() != body.position.is_some() {
        return Err(AppError::BadRequest(
            "parentId and position must be given together".into(),
        ));
    }
    if body.parent_id == Some(body.id) || body.referrer_id == Some(body.id) {
        return Err(AppError::BadRequest("member cannot be its own parent or referrer".into()));
    }
    if let Some(parent_id) = body.parent_id {
        if state.repo.get_member(parent_id).await?.is_none() {
            return Err(AppError::BadRequest(format!("unknown parent {}", parent_id)));
        }
    }

    let inserted = match state.repo.insert_member(&body).await {
        Ok(inserted) => inserted,
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
            return Err(AppError::Conflict(format!(
                "{} leg of {} is already taken",
                body.position.map(|p| p.as_str()).unwrap_or("?"),
                body.parent_id.map(|p| p.to_string()).unwrap_or_default()
            )));
        }
        Err(e) => return Err(e.into()),
    };
    if !inserted {
        return Err(AppError::Conflict(
            format!("member {} already exists", body.id),
        ));
    }
    let member = state
        .repo
        .get_member(body.id)
        .await?
        .ok_or_else(|| AppError::Internal("member vanished after insert".into()))?;
    Ok((StatusCode::CREATED, Json(member)))
}

pub async fn get_member(
    Path(id): Path<i64>,
    State(state): State<AppState>,
) -> Result<Json<MemberResponse>, AppError> {
    let member_id = MemberId(id);
    let member = state
        .repo
        .get_member(member_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("member {}", id)))?;

    let eligible = state.gate.eligible(&member).await?;
    let milestones = state.repo.list_milestones(member_id).await?;

    Ok(Json(MemberResponse {
        suspended: member.is_suspended(),
        eligible,
        milestones,
        member,
    }))
}

pub async fn member_registered(
    Path(id): Path<i64>,
    State(state): State<AppState>,
) -> Result<Json<MilestoneOutcome>, AppError> {
    let outcome = state.pipeline.on_member_registered(MemberId(id)).await?;
    Ok(Json(outcome))
}

/// Leg of `ancestor_id` that holds member `id`. An unrelated pair answers
/// `left`, which the walk logs.
pub async fn member_side(
    Path((id, ancestor_id)): Path<(i64, i64)>,
    State(state): State<AppState>,
) -> Result<Json<SideResponse>, AppError> {
    let member = state
        .repo
        .get_member(MemberId(id))
        .await?
        .ok_or_else(|| AppError::NotFound(format!("member {}", id)))?;
    if state.repo.get_member(MemberId(ancestor_id)).await?.is_none() {
        return Err(AppError::NotFound(format!("member {}", ancestor_id)));
    }

    let mut source = state.repo.as_ref();
    let side = TreeNavigator::side_of(&mut source, &member, MemberId(ancestor_id)).await?;
    Ok(Json(SideResponse {
        member_id: member.id,
        ancestor_id: MemberId(ancestor_id),
        side,
    }))
}
