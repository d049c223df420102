//! Turns a request's credential carrier into an authenticated principal.
//!
//! Runs on every protected request. Nothing is cached between calls, so a ban
//! or a revoked session takes effect on the very next request.

use chrono::{DateTime, Utc};

use super::error::AuthError;
use super::principal::Principal;
use super::request_context::{CredentialCarrier, RequestContext};
use super::session::SessionManager;
use crate::storage::SharedStore;

#[derive(Clone)]
pub struct IdentityResolver {
    store: SharedStore,
    sessions: SessionManager,
}

impl IdentityResolver {
    pub fn new(store: SharedStore, sessions: SessionManager) -> Self { Self { store, sessions } }

    pub fn resolve(&self, carrier: &CredentialCarrier) -> Result<RequestContext, AuthError> {
        self.resolve_at(carrier, Utc::now())
    }

    /// Expired sessions are reported but left in place; removal is the sweeper's job.
    pub fn resolve_at(&self, carrier: &CredentialCarrier, now: DateTime<Utc>) -> Result<RequestContext, AuthError> {
        let (kind, token) = carrier.token().ok_or(AuthError::AuthenticationRequired)?;
        let session = self.sessions.lookup(token)?.ok_or(AuthError::InvalidSession)?;
        if session.is_expired_at(now) {
            tracing::debug!(target: "identity.auth", user_id = session.user_id, expires_at = %session.expires_at, "expired session presented");
            return Err(AuthError::SessionExpired);
        }
        let Some(principal) = Principal::load(self.store.as_ref(), session.user_id)? else {
            tracing::warn!(target: "identity.auth", user_id = session.user_id, "session references a missing principal");
            return Err(AuthError::PrincipalNotFound(session.user_id));
        };
        if principal.is_disabled() {
            tracing::info!(target: "identity.auth", user_id = principal.id, status = ?principal.status, "disabled account presented a session");
            return Err(AuthError::AccountDisabled);
        }
        Ok(RequestContext { principal, session, carrier: kind })
    }
}
