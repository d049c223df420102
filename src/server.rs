//!
//! carebridge HTTP server
//! ----------------------
//! Axum-based HTTP surface over the identity layer.
//!
//! Responsibilities:
//! - Registration, login and logout endpoints.
//! - Cookie delivery of the session token to browser clients, response body for others.
//! - Self-service account endpoints and role-gated staff/admin endpoints.
//! - First-start admin bootstrap and an optional expired-session sweeper.
//!
//! Identity components are synchronous; every call into them runs on tokio's
//! blocking pool so hashing and store locks never stall the reactor.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::{delete, get, post, put};
use axum::{middleware, Json, Router};
use tracing::{info, warn};

use crate::config::Settings;
use crate::error::AppError;
use crate::identity::{
    AccountAdmin, AccountService, AuthError, AuthProvider, CredentialStore, IdentityResolver, LocalAuthProvider,
    RegistrationWorkflow, Role, SessionManager,
};
use crate::storage::{MemoryStore, SharedStore};

pub mod admin_routes;
pub mod auth_routes;
pub mod gate;
pub mod transport;
pub mod user_routes;
pub mod views;

/// Roles allowed to look up other accounts.
pub const STAFF_ROLES: [Role; 3] = [Role::Admin, Role::Expert, Role::Volunteer];
/// Roles allowed to use the account administration endpoints.
pub const ADMIN_ROLES: [Role; 2] = [Role::Admin, Role::Maintainer];

/// Everything a handler needs. Cheap to clone; all members are shared handles.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub store: SharedStore,
    pub sessions: SessionManager,
    pub resolver: IdentityResolver,
    pub registration: Arc<RegistrationWorkflow>,
    pub provider: Arc<dyn AuthProvider>,
    pub accounts: Arc<AccountService>,
    pub admin: Arc<AccountAdmin>,
}

impl AppState {
    pub fn new(settings: Settings, store: SharedStore) -> anyhow::Result<Self> {
        settings.validate()?;
        let credentials = Arc::new(CredentialStore::new(&settings.hashing)?);
        let sessions = SessionManager::new(store.clone(), settings.session_ttl());
        Ok(AppState {
            resolver: IdentityResolver::new(store.clone(), sessions.clone()),
            registration: Arc::new(RegistrationWorkflow::new(store.clone(), credentials.clone())),
            provider: Arc::new(LocalAuthProvider::new(store.clone(), credentials.clone(), sessions.clone())),
            accounts: Arc::new(AccountService::new(store.clone(), sessions.clone())),
            admin: Arc::new(AccountAdmin::new(store.clone(), credentials, sessions.clone())),
            settings: Arc::new(settings),
            store,
            sessions,
        })
    }
}

/// Run a synchronous identity call on the blocking pool.
pub(crate) async fn blocking<T, F>(f: F) -> Result<T, AppError>
where
    F: FnOnce() -> Result<T, AuthError> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(res) => res.map_err(AppError::from),
        Err(e) => Err(anyhow::anyhow!("blocking task failed: {e}").into()),
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

pub fn router(state: AppState) -> Router {
    let signed_in = Router::new()
        .route("/users/me", get(user_routes::me).put(user_routes::update_me).delete(user_routes::delete_me))
        .route_layer(middleware::from_fn_with_state(state.clone(), gate::authenticated));

    let staff = Router::new()
        .route("/users/{id}", get(user_routes::get_user))
        .route_layer(middleware::from_fn_with_state(gate::RoleGate::new(state.clone(), STAFF_ROLES), gate::require_roles));

    let admin = Router::new()
        .route("/admin/users/{id}/status", put(admin_routes::set_status))
        .route("/admin/users/{id}/roles", post(admin_routes::grant_role))
        .route("/admin/users/{id}/roles/{role}", delete(admin_routes::revoke_role))
        .route_layer(middleware::from_fn_with_state(gate::RoleGate::new(state.clone(), ADMIN_ROLES), gate::require_roles));

    Router::new()
        .route("/health", get(health))
        .route("/auth/register", post(auth_routes::register))
        .route("/auth/login", post(auth_routes::login))
        .route("/auth/logout", post(auth_routes::logout))
        .merge(signed_in)
        .merge(staff)
        .merge(admin)
        .with_state(state)
}

/// Periodically delete expired sessions. Resolution never depends on this running.
fn spawn_session_sweeper(sessions: SessionManager, interval_secs: u64) {
    tokio::spawn(async move {
        let period = std::time::Duration::from_secs(interval_secs);
        loop {
            tokio::time::sleep(period).await;
            let sm = sessions.clone();
            match tokio::task::spawn_blocking(move || sm.purge_expired(chrono::Utc::now())).await {
                Ok(Ok(removed)) => { if removed > 0 { tracing::debug!(target: "server", removed, "session_sweep"); } }
                Ok(Err(e)) => warn!(target: "server", error = %e, "session sweep failed"),
                Err(e) => warn!(target: "server", error = %e, "session sweep task failed"),
            }
        }
    });
}

/// Start the HTTP server with an in-memory store.
pub async fn run(settings: Settings) -> anyhow::Result<()> {
    let store: SharedStore = Arc::new(MemoryStore::new());
    run_with_store(settings, store).await
}

/// Start the HTTP server over the given store.
///
/// Creates the configured bootstrap admin if it does not exist yet and starts
/// the sweeper when an interval is configured.
pub async fn run_with_store(settings: Settings, store: SharedStore) -> anyhow::Result<()> {
    let state = AppState::new(settings, store)?;

    if let Some(bootstrap) = state.settings.bootstrap_admin.clone() {
        let admin = state.admin.clone();
        let created = blocking(move || admin.ensure_bootstrap_admin(&bootstrap.username, &bootstrap.password)).await?;
        match created {
            Some(p) => info!(target: "server", user_id = p.id, username = %p.username, "bootstrap admin created"),
            None => info!(target: "server", "bootstrap admin already present"),
        }
    }

    if state.settings.sweep_interval_secs > 0 {
        spawn_session_sweeper(state.sessions.clone(), state.settings.sweep_interval_secs);
    } else {
        info!(target: "server", "session sweeper disabled; expired sessions are rejected lazily");
    }

    let addr: SocketAddr = format!("0.0.0.0:{}", state.settings.http_port).parse()?;
    let app = router(state);
    info!(target: "server", "Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;

    Ok(())
}
