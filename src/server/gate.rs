//! Request gating. Each gate resolves the caller afresh and leaves the
//! resulting `RequestContext` in the request extensions for handlers.

use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;

use super::transport::carrier_from_headers;
use super::{blocking, AppState};
use crate::error::AppResult;
use crate::identity::{authorize, RequestContext, Role, RoleSet};

/// State for [`require_roles`]: the shared application state plus the
/// roles of which the caller must hold at least one.
#[derive(Clone)]
pub struct RoleGate {
    pub state: AppState,
    pub required: RoleSet,
}

impl RoleGate {
    pub fn new(state: AppState, required: impl IntoIterator<Item = Role>) -> Self {
        RoleGate { state, required: required.into_iter().collect() }
    }
}

async fn resolve(state: &AppState, headers: &HeaderMap) -> AppResult<RequestContext> {
    let carrier = carrier_from_headers(headers, &state.settings);
    let resolver = state.resolver.clone();
    blocking(move || resolver.resolve(&carrier)).await
}

pub async fn authenticated(State(state): State<AppState>, mut req: Request, next: Next) -> AppResult<Response> {
    let ctx = resolve(&state, req.headers()).await?;
    req.extensions_mut().insert(ctx);
    Ok(next.run(req).await)
}

pub async fn require_roles(State(gate): State<RoleGate>, mut req: Request, next: Next) -> AppResult<Response> {
    let ctx = resolve(&gate.state, req.headers()).await?;
    authorize(&ctx.principal, &gate.required)?;
    tracing::debug!(target: "server", user_id = ctx.principal.id, path = %req.uri().path(), "role gate passed");
    req.extensions_mut().insert(ctx);
    Ok(next.run(req).await)
}
