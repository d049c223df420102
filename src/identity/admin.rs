//! Privileged internal operations. This is the only code path that can add
//! `admin` or `maintainer` to a role set.

use std::sync::Arc;

use chrono::Utc;

use super::credentials::CredentialStore;
use super::error::AuthError;
use super::principal::{AccountStatus, Gender, Principal};
use super::roles::{Role, RoleSet, StoredRoles};
use super::session::SessionManager;
use crate::storage::{SharedStore, StoreError, UnitOfWork, UserId, UserRow};

pub struct AccountAdmin {
    store: SharedStore,
    credentials: Arc<CredentialStore>,
    sessions: SessionManager,
}

impl AccountAdmin {
    pub fn new(store: SharedStore, credentials: Arc<CredentialStore>, sessions: SessionManager) -> Self {
        Self { store, credentials, sessions }
    }

    fn save(&self, row: UserRow) -> Result<Principal, AuthError> {
        let id = row.id;
        let mut work = UnitOfWork::new();
        work.update_user(row);
        self.store.commit(work).map_err(|e| match e {
            StoreError::NotFound(_) => AuthError::NotFound(id),
            other => AuthError::Persistence(other),
        })?;
        Principal::load(self.store.as_ref(), id)?.ok_or(AuthError::NotFound(id))
    }

    /// Change lifecycle status. Banning also ends every live session of the account.
    pub fn set_status(&self, id: UserId, status: AccountStatus) -> Result<Principal, AuthError> {
        let mut row = self.store.user_by_id(id)?.ok_or(AuthError::NotFound(id))?;
        row.status = status;
        row.updated_at = Utc::now();
        let principal = self.save(row)?;
        if status == AccountStatus::Banned {
            self.sessions.revoke_all_for(id)?;
        }
        tracing::info!(target: "identity.admin", user_id = id, status = ?status, "status changed");
        Ok(principal)
    }

    /// Role changes never create or remove role profiles.
    pub fn grant_role(&self, id: UserId, role: Role) -> Result<Principal, AuthError> {
        self.edit_roles(id, |set| { set.insert(role); })
    }

    pub fn revoke_role(&self, id: UserId, role: Role) -> Result<Principal, AuthError> {
        self.edit_roles(id, |set| { set.remove(role); })
    }

    fn edit_roles(&self, id: UserId, edit: impl FnOnce(&mut RoleSet)) -> Result<Principal, AuthError> {
        let mut row = self.store.user_by_id(id)?.ok_or(AuthError::NotFound(id))?;
        let decoded = match StoredRoles::decode(row.roles.as_deref()) {
            StoredRoles::Valid(set) => Ok(set),
            StoredRoles::Missing => Err("role collection missing".to_string()),
            StoredRoles::Malformed { reason, .. } => Err(format!("role collection unreadable: {reason}")),
        };
        let mut set = decoded.map_err(|detail| {
            tracing::error!(target: "identity.admin", user_id = id, detail = %detail, "refusing role edit on unreadable role collection");
            AuthError::AuthorizationMisconfigured { user_id: id, detail }
        })?;
        edit(&mut set);
        row.roles = Some(set.encode());
        row.updated_at = Utc::now();
        let principal = self.save(row)?;
        tracing::info!(target: "identity.admin", user_id = id, roles = %set, "roles changed");
        Ok(principal)
    }

    /// Create an `admin` account with the given credentials unless the username is taken.
    /// Returns `None` when the account already existed.
    pub fn ensure_bootstrap_admin(&self, username: &str, password: &str) -> Result<Option<Principal>, AuthError> {
        if self.store.user_by_username(username)?.is_some() {
            return Ok(None);
        }
        let id = self.store.next_user_id()?;
        let now = Utc::now();
        let mut work = UnitOfWork::new();
        work.insert_user(UserRow {
            id,
            username: username.to_string(),
            email: None,
            password_hash: self.credentials.hash(password)?,
            nickname: None,
            avatar: None,
            gender: Gender::Hidden,
            roles: Some(RoleSet::from([Role::Admin]).encode()),
            status: AccountStatus::Active,
            is_active: true,
            created_at: now,
            updated_at: now,
        });
        match self.store.commit(work) {
            Ok(()) => {}
            // lost a race with another bootstrapper
            Err(StoreError::UniqueViolation(_)) => return Ok(None),
            Err(e) => return Err(e.into()),
        }
        tracing::info!(target: "identity.admin", user_id = id, username, "bootstrap admin created");
        Ok(Principal::load(self.store.as_ref(), id)?)
    }
}
