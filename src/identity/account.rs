//! Self-service changes to the caller's own account.

use chrono::Utc;
use serde::Deserialize;

use super::error::AuthError;
use super::principal::{Gender, Principal};
use super::registration::{conflict_error, validate_email, validate_username};
use super::session::SessionManager;
use crate::storage::{SharedStore, StoreError, UnitOfWork, UserId};

/// Editable fields of one's own account. Absent fields are left unchanged.
/// `password` exists only so that attempting it can be refused explicitly.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UserPatch {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub nickname: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub gender: Option<Gender>,
    #[serde(default)]
    pub password: Option<String>,
}

pub struct AccountService {
    store: SharedStore,
    sessions: SessionManager,
}

impl AccountService {
    pub fn new(store: SharedStore, sessions: SessionManager) -> Self { Self { store, sessions } }

    pub fn get(&self, id: UserId) -> Result<Principal, AuthError> {
        Principal::load(self.store.as_ref(), id)?.ok_or(AuthError::NotFound(id))
    }

    pub fn update(&self, id: UserId, patch: UserPatch) -> Result<Principal, AuthError> {
        if patch.password.is_some() {
            return Err(AuthError::PasswordChangeNotAllowed);
        }
        let mut row = self.store.user_by_id(id)?.ok_or(AuthError::NotFound(id))?;
        if let Some(username) = patch.username {
            let username = username.trim().to_string();
            validate_username(&username)?;
            row.username = username;
        }
        if let Some(email) = patch.email {
            let email = email.trim().to_string();
            // empty string clears the address
            row.email = if email.is_empty() { None } else { validate_email(&email)?; Some(email) };
        }
        if let Some(nickname) = patch.nickname { row.nickname = Some(nickname).filter(|s| !s.trim().is_empty()); }
        if let Some(avatar) = patch.avatar { row.avatar = Some(avatar).filter(|s| !s.trim().is_empty()); }
        if let Some(gender) = patch.gender { row.gender = gender; }
        row.updated_at = Utc::now();

        let mut work = UnitOfWork::new();
        work.update_user(row);
        self.store.commit(work).map_err(|e| match conflict_error(e) {
            AuthError::RegistrationFailed(StoreError::NotFound(_)) => AuthError::NotFound(id),
            AuthError::RegistrationFailed(other) => AuthError::Persistence(other),
            conflict => conflict,
        })?;
        tracing::info!(target: "identity.account", user_id = id, "account updated");
        self.get(id)
    }

    /// Remove the account, its profiles and every session it owns.
    pub fn delete(&self, id: UserId) -> Result<(), AuthError> {
        if !self.store.delete_user(id)? {
            return Err(AuthError::NotFound(id));
        }
        let revoked = self.sessions.revoke_all_for(id)?;
        tracing::info!(target: "identity.account", user_id = id, revoked, "account deleted");
        Ok(())
    }
}
