use axum::extract::State;
use axum::http::header::SET_COOKIE;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;

use super::transport::{carrier_from_headers, clear_session_cookie, is_web_client, set_session_cookie, AppJson, ClientMeta};
use super::views::{TokenLogin, UserView};
use super::{blocking, AppState};
use crate::error::AppResult;
use crate::identity::{CarrierKind, LoginRequest, RegistrationRequest};

#[derive(Debug, Deserialize)]
pub struct LoginPayload {
    pub username: String,
    pub password: String,
}

pub async fn register(State(state): State<AppState>, AppJson(req): AppJson<RegistrationRequest>) -> AppResult<Response> {
    let workflow = state.registration.clone();
    let principal = blocking(move || workflow.register(req)).await?;
    Ok((StatusCode::CREATED, Json(UserView::of(&principal, &principal))).into_response())
}

pub async fn login(State(state): State<AppState>, meta: ClientMeta, AppJson(payload): AppJson<LoginPayload>) -> AppResult<Response> {
    let web = is_web_client(meta.user_agent.as_deref(), &state.settings.web_client_marker);
    let req = LoginRequest { username: payload.username, password: payload.password, ip: meta.ip, user_agent: meta.user_agent };
    let provider = state.provider.clone();
    let res = blocking(move || provider.login(&req)).await?;
    let user = UserView::of(&res.principal, &res.principal);

    if web {
        let mut headers = HeaderMap::new();
        headers.insert(SET_COOKIE, set_session_cookie(&state.settings, &res.session.token)?);
        return Ok((StatusCode::OK, headers, Json(user)).into_response());
    }
    Ok((StatusCode::OK, Json(TokenLogin::new(user, &res.session))).into_response())
}

/// Always succeeds. Clears the cookie when the cookie carried the token.
pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> AppResult<Response> {
    let carrier = carrier_from_headers(&headers, &state.settings);
    let via_cookie = matches!(carrier.token(), Some((CarrierKind::Cookie, _)));
    let token = carrier.token().map(|(_, t)| t.to_string());
    let provider = state.provider.clone();
    blocking(move || provider.logout(token.as_deref())).await?;

    let mut out = HeaderMap::new();
    if via_cookie {
        out.insert(SET_COOKIE, clear_session_cookie(&state.settings)?);
    }
    Ok((StatusCode::OK, out, Json(serde_json::json!({"status": "ok"}))).into_response())
}
