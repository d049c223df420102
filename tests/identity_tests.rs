//! Identity integration tests: login, session resolution, revocation and role gating.
//! Everything runs against the in-memory store with cheap hashing parameters.

use std::sync::Arc;

use anyhow::Result;
use chrono::{Duration, Utc};

use carebridge::config::HashingSettings;
use carebridge::identity::{
    authorize, AccountAdmin, AccountService, AccountStatus, AuthError, AuthProvider, CredentialCarrier, CredentialStore,
    IdentityResolver, LocalAuthProvider, LoginRequest, RegistrationRequest, RegistrationWorkflow, Role, RoleSet,
    SessionManager, VolunteerProfileInput,
};
use carebridge::storage::{IdentityStore, MemoryStore, SharedStore};

struct Fixture {
    store: Arc<MemoryStore>,
    sessions: SessionManager,
    resolver: IdentityResolver,
    registration: RegistrationWorkflow,
    provider: LocalAuthProvider,
    accounts: AccountService,
    admin: AccountAdmin,
}

fn fixture() -> Fixture {
    let store = Arc::new(MemoryStore::new());
    let shared: SharedStore = store.clone();
    let credentials = Arc::new(CredentialStore::new(&HashingSettings::fast_insecure()).unwrap());
    let sessions = SessionManager::new(shared.clone(), Duration::hours(24));
    Fixture {
        resolver: IdentityResolver::new(shared.clone(), sessions.clone()),
        registration: RegistrationWorkflow::new(shared.clone(), credentials.clone()),
        provider: LocalAuthProvider::new(shared.clone(), credentials.clone(), sessions.clone()),
        accounts: AccountService::new(shared.clone(), sessions.clone()),
        admin: AccountAdmin::new(shared, credentials, sessions.clone()),
        store,
        sessions,
    }
}

fn family(username: &str) -> RegistrationRequest {
    RegistrationRequest {
        username: username.into(),
        password: "pw123".into(),
        roles: vec!["family".into()],
        ..Default::default()
    }
}

fn login(fx: &Fixture, username: &str, password: &str) -> Result<carebridge::identity::LoginResponse, AuthError> {
    fx.provider.login(&LoginRequest { username: username.into(), password: password.into(), ip: Some("127.0.0.1".into()), user_agent: Some("tests".into()) })
}

#[test]
fn login_resolve_logout_roundtrip() -> Result<()> {
    let fx = fixture();
    let alice = fx.registration.register(family("alice"))?;
    let res = login(&fx, "alice", "pw123")?;
    assert_eq!(res.principal.id, alice.id);
    assert_eq!(res.session.expires_at - res.session.created_at, Duration::hours(24));

    let ctx = fx.resolver.resolve(&CredentialCarrier::from_header(res.session.token.clone()))?;
    assert_eq!(ctx.principal.id, alice.id);
    assert_eq!(ctx.principal.username, "alice");

    fx.provider.logout(Some(&res.session.token))?;
    let err = fx.resolver.resolve(&CredentialCarrier::from_header(res.session.token)).unwrap_err();
    assert!(matches!(err, AuthError::InvalidSession));
    // logging out twice or with nothing is fine
    fx.provider.logout(None)?;
    fx.provider.logout(Some("nope"))?;
    Ok(())
}

#[test]
fn wrong_password_and_unknown_user_look_the_same() -> Result<()> {
    let fx = fixture();
    fx.registration.register(family("alice"))?;
    let a = login(&fx, "alice", "wrong").unwrap_err();
    let b = login(&fx, "mallory", "pw123").unwrap_err();
    assert!(matches!(a, AuthError::InvalidCredentials));
    assert!(matches!(b, AuthError::InvalidCredentials));
    assert_eq!(a.to_string(), b.to_string());
    assert_eq!(fx.store.session_count(), 0);
    Ok(())
}

#[test]
fn missing_credential_requires_authentication() {
    let fx = fixture();
    let err = fx.resolver.resolve(&CredentialCarrier::default()).unwrap_err();
    assert!(matches!(err, AuthError::AuthenticationRequired));
    let err = fx.resolver.resolve(&CredentialCarrier::from_cookie("  ")).unwrap_err();
    assert!(matches!(err, AuthError::AuthenticationRequired));
}

#[test]
fn expiry_is_absolute_and_lazy() -> Result<()> {
    let fx = fixture();
    let alice = fx.registration.register(family("alice"))?;
    let session = fx.sessions.create(alice.id, None, None)?;
    let carrier = CredentialCarrier::from_cookie(session.token.clone());

    // still valid at the exact expiry instant
    assert!(fx.resolver.resolve_at(&carrier, session.expires_at).is_ok());
    let later = session.expires_at + Duration::seconds(1);
    assert!(matches!(fx.resolver.resolve_at(&carrier, later), Err(AuthError::SessionExpired)));
    // the row is left for the sweeper
    assert!(fx.store.session(&session.token)?.is_some());
    assert_eq!(fx.sessions.purge_expired(later)?, 1);
    assert!(matches!(fx.resolver.resolve_at(&carrier, later), Err(AuthError::InvalidSession)));
    Ok(())
}

#[test]
fn orphaned_session_reports_missing_principal() -> Result<()> {
    let fx = fixture();
    let alice = fx.registration.register(family("alice"))?;
    let session = fx.sessions.create(alice.id, None, None)?;
    // drop the user row directly, leaving the session behind
    assert!(fx.store.delete_user(alice.id)?);
    let err = fx.resolver.resolve(&CredentialCarrier::from_header(session.token.clone())).unwrap_err();
    assert!(matches!(err, AuthError::PrincipalNotFound(id) if id == alice.id));
    assert!(fx.store.session(&session.token)?.is_some());
    Ok(())
}

#[test]
fn ban_takes_effect_on_next_request() -> Result<()> {
    let fx = fixture();
    let alice = fx.registration.register(family("alice"))?;
    let res = login(&fx, "alice", "pw123")?;
    let other = fx.sessions.create_with_ttl(alice.id, None, None, Duration::hours(1))?;
    let carrier = CredentialCarrier::from_header(res.session.token.clone());
    assert!(fx.resolver.resolve(&carrier).is_ok());

    fx.admin.set_status(alice.id, AccountStatus::Banned)?;
    assert!(fx.resolver.resolve(&carrier).is_err());
    assert!(fx.store.session(&other.token)?.is_none());
    assert!(matches!(login(&fx, "alice", "pw123"), Err(AuthError::AccountDisabled)));

    fx.admin.set_status(alice.id, AccountStatus::Active)?;
    assert!(login(&fx, "alice", "pw123").is_ok());
    Ok(())
}

#[test]
fn disabled_account_with_live_session_is_rejected() -> Result<()> {
    let fx = fixture();
    let alice = fx.registration.register(family("alice"))?;
    let session = fx.sessions.create(alice.id, None, None)?;
    // status flipped outside the admin path, so the session survives
    let mut row = fx.store.user_by_id(alice.id)?.unwrap();
    row.is_active = false;
    let mut work = carebridge::storage::UnitOfWork::new();
    work.update_user(row);
    fx.store.commit(work)?;
    let err = fx.resolver.resolve(&CredentialCarrier::from_header(session.token)).unwrap_err();
    assert!(matches!(err, AuthError::AccountDisabled));
    Ok(())
}

#[test]
fn role_gate_uses_any_of_semantics() -> Result<()> {
    let fx = fixture();
    let volunteer = fx.registration.register(RegistrationRequest {
        username: "vic".into(),
        password: "pw".into(),
        roles: vec!["volunteer".into()],
        volunteer_profile: Some(VolunteerProfileInput { full_name: "Vic V".into(), ..Default::default() }),
        ..Default::default()
    })?;
    let staff = RoleSet::from([Role::Admin, Role::Expert, Role::Volunteer]);
    assert!(authorize(&volunteer, &staff).is_ok());
    assert!(matches!(authorize(&volunteer, &RoleSet::from([Role::Admin])), Err(AuthError::Forbidden { .. })));
    assert!(matches!(authorize(&volunteer, &RoleSet::new()), Err(AuthError::Forbidden { .. })));
    Ok(())
}

#[test]
fn legacy_role_column_is_an_integrity_fault() -> Result<()> {
    let fx = fixture();
    let alice = fx.registration.register(family("alice"))?;
    let res = login(&fx, "alice", "pw123")?;

    fx.store.set_raw_roles(alice.id, Some("family,volunteer".into()))?;
    let ctx = fx.resolver.resolve(&CredentialCarrier::from_header(res.session.token.clone()))?;
    let err = authorize(&ctx.principal, &RoleSet::from([Role::Family])).unwrap_err();
    assert!(matches!(err, AuthError::AuthorizationMisconfigured { user_id, .. } if user_id == alice.id));

    fx.store.set_raw_roles(alice.id, None)?;
    let ctx = fx.resolver.resolve(&CredentialCarrier::from_header(res.session.token))?;
    assert!(matches!(authorize(&ctx.principal, &RoleSet::from([Role::Family])), Err(AuthError::AuthorizationMisconfigured { .. })));
    // role edits refuse to guess at the unreadable column
    assert!(matches!(fx.admin.grant_role(alice.id, Role::Volunteer), Err(AuthError::AuthorizationMisconfigured { .. })));
    Ok(())
}

#[test]
fn bootstrap_admin_is_created_once() -> Result<()> {
    let fx = fixture();
    let created = fx.admin.ensure_bootstrap_admin("root", "s3cret")?;
    let root = created.expect("admin created on first call");
    assert!(root.has_role(Role::Admin));
    assert!(fx.admin.ensure_bootstrap_admin("root", "other")?.is_none());
    assert_eq!(fx.store.user_count(), 1);
    assert!(login(&fx, "root", "s3cret").is_ok());
    Ok(())
}

#[test]
fn grant_and_revoke_leave_profiles_alone() -> Result<()> {
    let fx = fixture();
    let alice = fx.registration.register(family("alice"))?;
    let p = fx.admin.grant_role(alice.id, Role::Maintainer)?;
    assert!(p.has_role(Role::Maintainer) && p.has_role(Role::Family));
    let p = fx.admin.grant_role(alice.id, Role::Volunteer)?;
    assert!(p.has_role(Role::Volunteer));
    assert!(p.volunteer_profile.is_none());
    let p = fx.admin.revoke_role(alice.id, Role::Maintainer)?;
    assert!(!p.has_role(Role::Maintainer));
    assert!(matches!(fx.admin.grant_role(999, Role::Family), Err(AuthError::NotFound(999))));
    Ok(())
}

#[test]
fn deleting_own_account_ends_sessions() -> Result<()> {
    let fx = fixture();
    let alice = fx.registration.register(family("alice"))?;
    let res = login(&fx, "alice", "pw123")?;
    fx.accounts.delete(alice.id)?;
    assert_eq!(fx.store.session_count(), 0);
    assert!(fx.resolver.resolve(&CredentialCarrier::from_header(res.session.token)).is_err());
    assert!(matches!(fx.accounts.delete(alice.id), Err(AuthError::NotFound(_))));
    Ok(())
}

#[test]
fn self_update_rejects_password_and_enforces_uniqueness() -> Result<()> {
    let fx = fixture();
    let alice = fx.registration.register(family("alice"))?;
    fx.registration.register(family("bob"))?;

    let patch: carebridge::identity::UserPatch = serde_json::from_value(serde_json::json!({"password": "new"}))?;
    assert!(matches!(fx.accounts.update(alice.id, patch), Err(AuthError::PasswordChangeNotAllowed)));
    assert!(login(&fx, "alice", "pw123").is_ok());

    let patch = serde_json::from_value(serde_json::json!({"username": "bob"}))?;
    assert!(matches!(fx.accounts.update(alice.id, patch), Err(AuthError::DuplicateUsername(_))));

    let patch = serde_json::from_value(serde_json::json!({"nickname": "Al", "email": "alice@example.org"}))?;
    let updated = fx.accounts.update(alice.id, patch)?;
    assert_eq!(updated.nickname.as_deref(), Some("Al"));
    assert_eq!(updated.email.as_deref(), Some("alice@example.org"));
    assert!(serde_json::from_value::<carebridge::identity::UserPatch>(serde_json::json!({"roles": ["admin"]})).is_err());
    Ok(())
}
