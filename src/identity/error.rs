use super::roles::{Role, RoleSet};
use crate::storage::{StoreError, UserId};

/// Failures of the identity layer.
///
/// The first group is what a caller sees as "unauthorized"; their display text
/// is for logs only and is replaced by a generic message at the HTTP boundary.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("no session credential presented")]
    AuthenticationRequired,
    #[error("session token does not match a stored session")]
    InvalidSession,
    #[error("session expired")]
    SessionExpired,
    #[error("session references missing principal {0}")]
    PrincipalNotFound(UserId),
    #[error("account is disabled")]
    AccountDisabled,
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("forbidden: principal holds {held}, requires one of {required}")]
    Forbidden { held: RoleSet, required: RoleSet },
    #[error("authorization misconfigured for principal {user_id}: {detail}")]
    AuthorizationMisconfigured { user_id: UserId, detail: String },

    #[error("username already exists: {0}")]
    DuplicateUsername(String),
    #[error("email already exists: {0}")]
    DuplicateEmail(String),
    #[error("{0} profile details are required")]
    ProfileRequired(Role),
    #[error("roles cannot be self-assigned: {0}")]
    ForbiddenRoleRequested(RoleSet),
    #[error("{0}")]
    Validation(String),
    #[error("password cannot be changed through this operation")]
    PasswordChangeNotAllowed,
    #[error("registration failed: {0}")]
    RegistrationFailed(#[source] StoreError),

    #[error("user {0} not found")]
    NotFound(UserId),
    #[error("password hashing failed: {0}")]
    Hashing(String),
    #[error("session expiry {0}s from now is out of range")]
    ExpiryOutOfRange(i64),
    #[error("secure random source failed: {0}")]
    Entropy(String),
    #[error(transparent)]
    Persistence(#[from] StoreError),
}

impl AuthError {
    /// Errors surfaced to clients as "unauthorized".
    pub fn is_unauthenticated(&self) -> bool {
        matches!(
            self,
            AuthError::AuthenticationRequired
                | AuthError::InvalidSession
                | AuthError::SessionExpired
                | AuthError::PrincipalNotFound(_)
                | AuthError::AccountDisabled
                | AuthError::InvalidCredentials
        )
    }

    pub fn code(&self) -> &'static str {
        match self {
            AuthError::AuthenticationRequired => "authentication_required",
            AuthError::InvalidSession => "invalid_session",
            AuthError::SessionExpired => "session_expired",
            AuthError::PrincipalNotFound(_) => "principal_not_found",
            AuthError::AccountDisabled => "account_disabled",
            AuthError::InvalidCredentials => "invalid_credentials",
            AuthError::Forbidden { .. } => "forbidden",
            AuthError::AuthorizationMisconfigured { .. } => "authorization_misconfigured",
            AuthError::DuplicateUsername(_) => "duplicate_username",
            AuthError::DuplicateEmail(_) => "duplicate_email",
            AuthError::ProfileRequired(_) => "profile_required",
            AuthError::ForbiddenRoleRequested(_) => "forbidden_role_requested",
            AuthError::Validation(_) => "validation_failed",
            AuthError::PasswordChangeNotAllowed => "password_change_not_allowed",
            AuthError::RegistrationFailed(_) => "registration_failed",
            AuthError::NotFound(_) => "not_found",
            AuthError::Hashing(_) => "hashing_failed",
            AuthError::ExpiryOutOfRange(_) => "expiry_out_of_range",
            AuthError::Entropy(_) => "entropy_failed",
            AuthError::Persistence(_) => "persistence_failed",
        }
    }
}

pub type AuthResult<T> = Result<T, AuthError>;
