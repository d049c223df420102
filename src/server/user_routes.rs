use axum::extract::{Path, State};
use axum::http::header::SET_COOKIE;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};

use super::transport::{clear_session_cookie, AppJson};
use super::views::UserView;
use super::{blocking, AppState};
use crate::error::AppResult;
use crate::identity::{CarrierKind, RequestContext, UserPatch};
use crate::storage::UserId;

pub async fn me(Extension(ctx): Extension<RequestContext>) -> Json<UserView> {
    Json(UserView::of(&ctx.principal, &ctx.principal))
}

pub async fn update_me(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    AppJson(patch): AppJson<UserPatch>,
) -> AppResult<Json<UserView>> {
    let accounts = state.accounts.clone();
    let id = ctx.principal.id;
    let updated = blocking(move || accounts.update(id, patch)).await?;
    Ok(Json(UserView::of(&updated, &updated)))
}

pub async fn delete_me(State(state): State<AppState>, Extension(ctx): Extension<RequestContext>) -> AppResult<Response> {
    let accounts = state.accounts.clone();
    let id = ctx.principal.id;
    blocking(move || accounts.delete(id)).await?;
    let mut headers = HeaderMap::new();
    if ctx.carrier == CarrierKind::Cookie {
        headers.insert(SET_COOKIE, clear_session_cookie(&state.settings)?);
    }
    Ok((StatusCode::NO_CONTENT, headers).into_response())
}

pub async fn get_user(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<UserId>,
) -> AppResult<Json<UserView>> {
    let accounts = state.accounts.clone();
    let subject = blocking(move || accounts.get(id)).await?;
    Ok(Json(UserView::of(&subject, &ctx.principal)))
}
