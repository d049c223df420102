//! Persistence seam for accounts, role profiles and sessions.
//!
//! Everything above this module talks to an [`IdentityStore`]. Multi-row
//! writes are expressed as a [`UnitOfWork`] and applied by `commit` as a
//! single atomic step: either every operation lands or none does.
//! Reads always go to the store; callers do not keep copies between requests.

use std::fmt::{Display, Formatter};
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::identity::{AccountStatus, ExpertProfile, Gender, Session, VolunteerProfile};

mod memory;

pub use memory::MemoryStore;

pub type UserId = i64;

/// Persisted form of a user account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRow {
    pub id: UserId,
    pub username: String,
    pub email: Option<String>,
    pub password_hash: String,
    pub nickname: Option<String>,
    pub avatar: Option<String>,
    pub gender: Gender,
    /// JSON array of role tags; see `identity::StoredRoles`.
    pub roles: Option<String>,
    pub status: AccountStatus,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UniqueKey {
    Username(String),
    Email(String),
    UserId(UserId),
    VolunteerProfile(UserId),
    ExpertProfile(UserId),
    SessionToken,
}

impl Display for UniqueKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            UniqueKey::Username(u) => write!(f, "users.username={u}"),
            UniqueKey::Email(e) => write!(f, "users.email={e}"),
            UniqueKey::UserId(id) => write!(f, "users.id={id}"),
            UniqueKey::VolunteerProfile(id) => write!(f, "volunteer_profiles.user_id={id}"),
            UniqueKey::ExpertProfile(id) => write!(f, "expert_profiles.user_id={id}"),
            UniqueKey::SessionToken => f.write_str("sessions.session_id"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("unique constraint violated on {0}")]
    UniqueViolation(UniqueKey),
    #[error("foreign key violated: {0}")]
    ForeignKeyViolation(String),
    #[error("row not found: {0}")]
    NotFound(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    InsertUser(UserRow),
    /// Replace an existing row wholesale.
    UpdateUser(UserRow),
    InsertVolunteerProfile(VolunteerProfile),
    InsertExpertProfile(ExpertProfile),
}

/// Ordered batch of writes applied atomically by [`IdentityStore::commit`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnitOfWork {
    ops: Vec<WriteOp>,
}

impl UnitOfWork {
    pub fn new() -> Self { Self::default() }

    pub fn insert_user(&mut self, row: UserRow) -> &mut Self { self.ops.push(WriteOp::InsertUser(row)); self }
    pub fn update_user(&mut self, row: UserRow) -> &mut Self { self.ops.push(WriteOp::UpdateUser(row)); self }
    pub fn insert_volunteer_profile(&mut self, p: VolunteerProfile) -> &mut Self { self.ops.push(WriteOp::InsertVolunteerProfile(p)); self }
    pub fn insert_expert_profile(&mut self, p: ExpertProfile) -> &mut Self { self.ops.push(WriteOp::InsertExpertProfile(p)); self }

    pub fn ops(&self) -> &[WriteOp] { &self.ops }
    pub fn is_empty(&self) -> bool { self.ops.is_empty() }
    pub fn into_ops(self) -> Vec<WriteOp> { self.ops }
}

/// Store of record for principals, profiles and sessions.
///
/// Implementations are shared across request handlers and must be safe for
/// concurrent use. Calls may block on I/O.
pub trait IdentityStore: Send + Sync {
    /// Reserve a fresh user id. Ids of rolled-back work are not reused.
    fn next_user_id(&self) -> StoreResult<UserId>;
    fn commit(&self, work: UnitOfWork) -> StoreResult<()>;

    fn user_by_id(&self, id: UserId) -> StoreResult<Option<UserRow>>;
    fn user_by_username(&self, username: &str) -> StoreResult<Option<UserRow>>;
    fn volunteer_profile(&self, user_id: UserId) -> StoreResult<Option<VolunteerProfile>>;
    fn expert_profile(&self, user_id: UserId) -> StoreResult<Option<ExpertProfile>>;
    /// Delete a user and cascade to its profiles. Sessions are not touched.
    fn delete_user(&self, id: UserId) -> StoreResult<bool>;

    fn insert_session(&self, session: &Session) -> StoreResult<()>;
    fn session(&self, token: &str) -> StoreResult<Option<Session>>;
    fn delete_session(&self, token: &str) -> StoreResult<bool>;
    fn delete_sessions_for_user(&self, user_id: UserId) -> StoreResult<usize>;
    /// Remove sessions whose expiry is strictly before `cutoff`.
    fn delete_sessions_expired_before(&self, cutoff: DateTime<Utc>) -> StoreResult<usize>;
}

/// Thread-safe handle shared by every component.
pub type SharedStore = Arc<dyn IdentityStore>;
