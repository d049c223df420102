use std::sync::Arc;

use super::credentials::CredentialStore;
use super::error::AuthError;
use super::principal::Principal;
use super::session::{Session, SessionManager};
use crate::storage::SharedStore;

#[derive(Debug, Clone)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone)]
pub struct LoginResponse {
    pub principal: Principal,
    pub session: Session,
}

pub trait AuthProvider: Send + Sync {
    fn login(&self, req: &LoginRequest) -> Result<LoginResponse, AuthError>;
    /// Always succeeds for unknown or missing tokens.
    fn logout(&self, token: Option<&str>) -> Result<(), AuthError>;
}

/// Password login against the identity store.
pub struct LocalAuthProvider {
    store: SharedStore,
    credentials: Arc<CredentialStore>,
    sessions: SessionManager,
}

impl LocalAuthProvider {
    pub fn new(store: SharedStore, credentials: Arc<CredentialStore>, sessions: SessionManager) -> Self {
        Self { store, credentials, sessions }
    }
}

impl AuthProvider for LocalAuthProvider {
    fn login(&self, req: &LoginRequest) -> Result<LoginResponse, AuthError> {
        let Some(row) = self.store.user_by_username(req.username.trim())? else {
            // Same cost as a wrong password so response timing does not reveal unknown usernames.
            self.credentials.verify_decoy(&req.password);
            tracing::info!(target: "identity.auth", "login failed");
            return Err(AuthError::InvalidCredentials);
        };
        if !self.credentials.verify(&req.password, &row.password_hash) {
            tracing::info!(target: "identity.auth", user_id = row.id, "login failed");
            return Err(AuthError::InvalidCredentials);
        }
        let id = row.id;
        let Some(principal) = Principal::load(self.store.as_ref(), id)? else {
            // deleted between the two reads
            return Err(AuthError::InvalidCredentials);
        };
        if principal.is_disabled() {
            tracing::info!(target: "identity.auth", user_id = id, status = ?principal.status, "login refused for disabled account");
            return Err(AuthError::AccountDisabled);
        }
        let session = self.sessions.create(id, req.ip.clone(), req.user_agent.clone())?;
        tracing::info!(target: "identity.auth", user_id = id, ip = ?req.ip, "auth.login");
        Ok(LoginResponse { principal, session })
    }

    fn logout(&self, token: Option<&str>) -> Result<(), AuthError> {
        if let Some(token) = token.map(str::trim).filter(|t| !t.is_empty()) {
            self.sessions.revoke(token)?;
        }
        Ok(())
    }
}
