//! Outward JSON shapes. Contact phone numbers are only shown to contact viewers.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::identity::{can_view_contact_details, AccountStatus, ExpertProfile, Gender, Principal, RoleSet, Session, VolunteerProfile};
use crate::storage::UserId;

#[derive(Debug, Clone, Serialize)]
pub struct UserView {
    pub id: UserId,
    pub username: String,
    pub email: Option<String>,
    pub nickname: Option<String>,
    pub avatar: Option<String>,
    pub gender: Gender,
    /// `null` when the stored role collection could not be read.
    pub roles: Option<RoleSet>,
    pub status: AccountStatus,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volunteer_profile: Option<VolunteerProfile>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expert_profile: Option<ExpertProfile>,
}

impl UserView {
    /// Render `subject` as seen by `viewer`.
    pub fn of(subject: &Principal, viewer: &Principal) -> Self {
        let show_phone = can_view_contact_details(viewer);
        let mut volunteer_profile = subject.volunteer_profile.clone();
        let mut expert_profile = subject.expert_profile.clone();
        if !show_phone {
            if let Some(p) = volunteer_profile.as_mut() { p.phone = None; }
            if let Some(p) = expert_profile.as_mut() { p.phone = None; }
        }
        UserView {
            id: subject.id,
            username: subject.username.clone(),
            email: subject.email.clone(),
            nickname: subject.nickname.clone(),
            avatar: subject.avatar.clone(),
            gender: subject.gender,
            roles: subject.role_set().cloned(),
            status: subject.status,
            is_active: subject.is_active,
            created_at: subject.created_at,
            updated_at: subject.updated_at,
            volunteer_profile,
            expert_profile,
        }
    }
}

/// Login result for non-browser clients, which keep the token themselves.
#[derive(Debug, Clone, Serialize)]
pub struct TokenLogin {
    pub user: UserView,
    pub session_id: String,
    pub expires_at: DateTime<Utc>,
}

impl TokenLogin {
    pub fn new(user: UserView, session: &Session) -> Self {
        TokenLogin { user, session_id: session.token.clone(), expires_at: session.expires_at }
    }
}
