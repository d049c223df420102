//! Public sign-up: one principal plus one profile per specialized role,
//! written in a single unit of work.
//!
//! Validation finishes before anything touches the store, so a rejected
//! request leaves no rows behind. A commit failure rolls back every row of
//! the attempt, including a lost race on the username.

use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;

use super::credentials::CredentialStore;
use super::error::AuthError;
use super::principal::{AccountStatus, ExpertProfile, Gender, Principal, ReviewStatus, VolunteerProfile, WorkStatus};
use super::roles::{Role, RoleSet};
use crate::storage::{SharedStore, StoreError, UniqueKey, UnitOfWork, UserId, UserRow};

pub const MAX_USERNAME_LEN: usize = 150;
pub const MAX_PASSWORD_LEN: usize = 1024;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VolunteerProfileInput {
    pub full_name: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub public_email: Option<String>,
    #[serde(default)]
    pub is_public_visible: bool,
    #[serde(default)]
    pub service_hours: u32,
    #[serde(default)]
    pub skills: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExpertProfileInput {
    pub full_name: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub public_email: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub org: Option<String>,
    #[serde(default)]
    pub skills: Vec<String>,
}

/// Role tags arrive as raw strings so unknown tags become a validation
/// error with a readable message.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegistrationRequest {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub nickname: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub gender: Option<Gender>,
    pub roles: Vec<String>,
    #[serde(default)]
    pub volunteer_profile: Option<VolunteerProfileInput>,
    #[serde(default)]
    pub expert_profile: Option<ExpertProfileInput>,
}

pub(crate) fn validate_username(username: &str) -> Result<(), AuthError> {
    if username.is_empty() {
        return Err(AuthError::Validation("username must not be empty".into()));
    }
    if username.chars().count() > MAX_USERNAME_LEN {
        return Err(AuthError::Validation(format!("username must be at most {MAX_USERNAME_LEN} characters")));
    }
    if username.chars().any(char::is_whitespace) {
        return Err(AuthError::Validation("username must not contain whitespace".into()));
    }
    Ok(())
}

pub(crate) fn validate_email(email: &str) -> Result<(), AuthError> {
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() && !email.contains(char::is_whitespace) => Ok(()),
        _ => Err(AuthError::Validation(format!("invalid email address '{email}'"))),
    }
}

fn blank_to_none(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// Checked form of a request; building it performs every validation step.
struct ValidatedRegistration {
    username: String,
    password: String,
    email: Option<String>,
    nickname: Option<String>,
    avatar: Option<String>,
    gender: Gender,
    roles: RoleSet,
    volunteer: Option<VolunteerProfileInput>,
    expert: Option<ExpertProfileInput>,
}

impl ValidatedRegistration {
    fn try_from_request(req: RegistrationRequest) -> Result<Self, AuthError> {
        let mut roles = RoleSet::new();
        let mut unknown = Vec::new();
        for tag in &req.roles {
            match tag.trim().parse::<Role>() {
                Ok(role) => { roles.insert(role); }
                Err(_) => unknown.push(tag.clone()),
            }
        }
        // Privileged roles are refused before any other check.
        let privileged = roles.privileged();
        if !privileged.is_empty() {
            return Err(AuthError::ForbiddenRoleRequested(privileged));
        }
        if !unknown.is_empty() {
            return Err(AuthError::Validation(format!("unknown roles: {}", unknown.join(", "))));
        }
        if roles.is_empty() {
            return Err(AuthError::Validation("at least one role is required".into()));
        }

        let username = req.username.trim().to_string();
        validate_username(&username)?;
        if req.password.is_empty() {
            return Err(AuthError::Validation("password must not be empty".into()));
        }
        if req.password.len() > MAX_PASSWORD_LEN {
            return Err(AuthError::Validation(format!("password must be at most {MAX_PASSWORD_LEN} bytes")));
        }
        let email = blank_to_none(req.email);
        if let Some(e) = &email { validate_email(e)?; }

        let volunteer = if roles.contains(Role::Volunteer) {
            let p = req.volunteer_profile.ok_or(AuthError::ProfileRequired(Role::Volunteer))?;
            require_full_name(&p.full_name, Role::Volunteer)?;
            Some(p)
        } else {
            None
        };
        let expert = if roles.contains(Role::Expert) {
            let p = req.expert_profile.ok_or(AuthError::ProfileRequired(Role::Expert))?;
            require_full_name(&p.full_name, Role::Expert)?;
            Some(p)
        } else {
            None
        };

        Ok(Self {
            username,
            password: req.password,
            email,
            nickname: blank_to_none(req.nickname),
            avatar: blank_to_none(req.avatar),
            gender: req.gender.unwrap_or_default(),
            roles,
            volunteer,
            expert,
        })
    }
}

fn require_full_name(full_name: &str, role: Role) -> Result<(), AuthError> {
    if full_name.trim().is_empty() {
        return Err(AuthError::Validation(format!("{role} profile full_name must not be empty")));
    }
    Ok(())
}

fn volunteer_row(user_id: UserId, input: VolunteerProfileInput) -> VolunteerProfile {
    VolunteerProfile {
        user_id,
        full_name: input.full_name.trim().to_string(),
        phone: blank_to_none(input.phone),
        public_email: blank_to_none(input.public_email),
        is_public_visible: input.is_public_visible,
        service_hours: input.service_hours,
        skills: input.skills,
        status: ReviewStatus::Pending,
        work_status: WorkStatus::Offline,
    }
}

fn expert_row(user_id: UserId, input: ExpertProfileInput) -> ExpertProfile {
    ExpertProfile {
        user_id,
        full_name: input.full_name.trim().to_string(),
        phone: blank_to_none(input.phone),
        public_email: blank_to_none(input.public_email),
        title: blank_to_none(input.title),
        org: blank_to_none(input.org),
        skills: input.skills,
        status: ReviewStatus::Pending,
    }
}

/// Map a commit failure to the registration error taxonomy.
pub(crate) fn conflict_error(err: StoreError) -> AuthError {
    match err {
        StoreError::UniqueViolation(UniqueKey::Username(u)) => AuthError::DuplicateUsername(u),
        StoreError::UniqueViolation(UniqueKey::Email(e)) => AuthError::DuplicateEmail(e),
        other => AuthError::RegistrationFailed(other),
    }
}

pub struct RegistrationWorkflow {
    store: SharedStore,
    credentials: Arc<CredentialStore>,
}

impl RegistrationWorkflow {
    pub fn new(store: SharedStore, credentials: Arc<CredentialStore>) -> Self { Self { store, credentials } }

    pub fn register(&self, req: RegistrationRequest) -> Result<Principal, AuthError> {
        let v = ValidatedRegistration::try_from_request(req).inspect_err(|e| {
            tracing::info!(target: "identity.registration", error = %e, "registration rejected");
        })?;

        // Cheap early exit; the commit below is still the authority on uniqueness.
        if self.store.user_by_username(&v.username)?.is_some() {
            return Err(AuthError::DuplicateUsername(v.username));
        }

        let password_hash = self.credentials.hash(&v.password)?;
        let id = self.store.next_user_id().map_err(AuthError::RegistrationFailed)?;
        let now = Utc::now();
        let mut work = UnitOfWork::new();
        work.insert_user(UserRow {
            id,
            username: v.username.clone(),
            email: v.email,
            password_hash,
            nickname: v.nickname,
            avatar: v.avatar,
            gender: v.gender,
            roles: Some(v.roles.encode()),
            status: AccountStatus::Active,
            is_active: true,
            created_at: now,
            updated_at: now,
        });
        if let Some(input) = v.volunteer { work.insert_volunteer_profile(volunteer_row(id, input)); }
        if let Some(input) = v.expert { work.insert_expert_profile(expert_row(id, input)); }

        self.store.commit(work).map_err(|e| {
            let err = conflict_error(e);
            tracing::info!(target: "identity.registration", username = %v.username, error = %err, "registration rolled back");
            err
        })?;
        tracing::info!(target: "identity.registration", user_id = id, username = %v.username, roles = %v.roles, "registered principal");

        Principal::load(self.store.as_ref(), id)
            .map_err(AuthError::RegistrationFailed)?
            .ok_or_else(|| AuthError::RegistrationFailed(StoreError::NotFound(format!("users.id={id}"))))
    }
}
