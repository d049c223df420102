use axum::extract::{Path, State};
use axum::{Extension, Json};
use serde::Deserialize;

use super::transport::AppJson;
use super::views::UserView;
use super::{blocking, AppState};
use crate::error::{AppError, AppResult};
use crate::identity::{AccountStatus, RequestContext, Role};
use crate::storage::UserId;

#[derive(Debug, Deserialize)]
pub struct StatusPayload {
    pub status: AccountStatus,
}

#[derive(Debug, Deserialize)]
pub struct RolePayload {
    pub role: Role,
}

pub async fn set_status(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<UserId>,
    AppJson(payload): AppJson<StatusPayload>,
) -> AppResult<Json<UserView>> {
    let admin = state.admin.clone();
    let updated = blocking(move || admin.set_status(id, payload.status)).await?;
    tracing::info!(target: "server", actor = ctx.principal.id, user_id = id, status = ?updated.status, "admin.set_status");
    Ok(Json(UserView::of(&updated, &ctx.principal)))
}

pub async fn grant_role(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<UserId>,
    AppJson(payload): AppJson<RolePayload>,
) -> AppResult<Json<UserView>> {
    let admin = state.admin.clone();
    let role = payload.role;
    let updated = blocking(move || admin.grant_role(id, role)).await?;
    tracing::info!(target: "server", actor = ctx.principal.id, user_id = id, role = %role, "admin.grant_role");
    Ok(Json(UserView::of(&updated, &ctx.principal)))
}

pub async fn revoke_role(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path((id, role)): Path<(UserId, String)>,
) -> AppResult<Json<UserView>> {
    let role: Role = role.parse().map_err(|e: crate::identity::UnknownRole| AppError::user("unknown_role".to_string(), e.to_string()))?;
    let admin = state.admin.clone();
    let updated = blocking(move || admin.revoke_role(id, role)).await?;
    tracing::info!(target: "server", actor = ctx.principal.id, user_id = id, role = %role, "admin.revoke_role");
    Ok(Json(UserView::of(&updated, &ctx.principal)))
}
