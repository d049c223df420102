use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::roles::{Role, RoleSet, StoredRoles};
use crate::storage::{IdentityStore, StoreResult, UserId, UserRow};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
    #[default]
    Hidden,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    #[default]
    Active,
    Banned,
    PendingReview,
}

/// Review state of a role profile. Profiles are never created approved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkStatus {
    Online,
    Busy,
    #[default]
    Offline,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolunteerProfile {
    pub user_id: UserId,
    pub full_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    pub public_email: Option<String>,
    pub is_public_visible: bool,
    pub service_hours: u32,
    pub skills: Vec<String>,
    pub status: ReviewStatus,
    pub work_status: WorkStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpertProfile {
    pub user_id: UserId,
    pub full_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    pub public_email: Option<String>,
    pub title: Option<String>,
    pub org: Option<String>,
    pub skills: Vec<String>,
    pub status: ReviewStatus,
}

/// A fully loaded user account: the user row plus any role profiles.
///
/// The password hash never leaves the storage row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub id: UserId,
    pub username: String,
    pub email: Option<String>,
    pub nickname: Option<String>,
    pub avatar: Option<String>,
    pub gender: Gender,
    pub roles: StoredRoles,
    pub status: AccountStatus,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub volunteer_profile: Option<VolunteerProfile>,
    pub expert_profile: Option<ExpertProfile>,
}

impl Principal {
    pub fn from_row(row: UserRow, volunteer_profile: Option<VolunteerProfile>, expert_profile: Option<ExpertProfile>) -> Self {
        Self {
            id: row.id,
            username: row.username,
            email: row.email,
            nickname: row.nickname,
            avatar: row.avatar,
            gender: row.gender,
            roles: StoredRoles::decode(row.roles.as_deref()),
            status: row.status,
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
            volunteer_profile,
            expert_profile,
        }
    }

    /// Fetch the user row and its profiles. `None` when the user does not exist.
    pub fn load(store: &dyn IdentityStore, id: UserId) -> StoreResult<Option<Principal>> {
        let Some(row) = store.user_by_id(id)? else { return Ok(None); };
        let volunteer = store.volunteer_profile(id)?;
        let expert = store.expert_profile(id)?;
        let principal = Principal::from_row(row, volunteer, expert);
        if let StoredRoles::Malformed { raw, reason } = &principal.roles {
            tracing::warn!(target: "identity.principal", user_id = id, raw = %raw, reason = %reason, "stored role column failed validation");
        }
        Ok(Some(principal))
    }

    /// Roles when the stored column decoded cleanly.
    pub fn role_set(&self) -> Option<&RoleSet> { self.roles.as_set() }

    pub fn has_role(&self, role: Role) -> bool { self.role_set().is_some_and(|s| s.contains(role)) }

    /// Banned or deactivated accounts cannot authenticate.
    pub fn is_disabled(&self) -> bool { self.status == AccountStatus::Banned || !self.is_active }
}
