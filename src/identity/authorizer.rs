use super::error::AuthError;
use super::principal::Principal;
use super::roles::{Role, RoleSet, StoredRoles};

/// Roles allowed to see contact details (phone numbers) of other accounts.
pub const CONTACT_VIEWER_ROLES: [Role; 2] = [Role::Admin, Role::Expert];

/// Succeeds when the principal holds at least one of `required`.
///
/// A principal whose stored roles could not be read is an integrity fault,
/// reported as `AuthorizationMisconfigured` rather than a plain denial.
pub fn authorize(principal: &Principal, required: &RoleSet) -> Result<(), AuthError> {
    let held = match &principal.roles {
        StoredRoles::Valid(set) => set,
        StoredRoles::Missing => {
            tracing::error!(target: "identity.authz", user_id = principal.id, "principal has no role collection");
            return Err(AuthError::AuthorizationMisconfigured { user_id: principal.id, detail: "role collection missing".into() });
        }
        StoredRoles::Malformed { raw, reason } => {
            tracing::error!(target: "identity.authz", user_id = principal.id, raw = %raw, reason = %reason, "principal role collection is corrupt");
            return Err(AuthError::AuthorizationMisconfigured { user_id: principal.id, detail: format!("role collection unreadable: {reason}") });
        }
    };
    if held.intersects(required) {
        return Ok(());
    }
    tracing::debug!(target: "identity.authz", user_id = principal.id, held = %held, required = %required, "role gate denied");
    Err(AuthError::Forbidden { held: held.clone(), required: required.clone() })
}

/// Whether `viewer` may see phone numbers in profile output.
pub fn can_view_contact_details(viewer: &Principal) -> bool {
    CONTACT_VIEWER_ROLES.iter().any(|r| viewer.has_role(*r))
}
