use base64::Engine;
use chrono::{DateTime, Duration, Utc};

use super::error::AuthError;
use crate::storage::{SharedStore, StoreResult, UserId};

pub type SessionToken = String;

/// Bytes of CSPRNG output per token (256 bits).
const TOKEN_BYTES: usize = 32;

/// Server-side login session. The token is the primary key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub token: SessionToken,
    pub user_id: UserId,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Recorded for audit only; never used to accept or reject a session.
    pub user_agent: Option<String>,
    pub ip: Option<String>,
}

impl Session {
    /// Expired once `now` is strictly past the expiry instant.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool { self.expires_at < now }
}

fn gen_token() -> Result<SessionToken, AuthError> {
    let mut buf = [0u8; TOKEN_BYTES];
    getrandom::getrandom(&mut buf).map_err(|e| AuthError::Entropy(e.to_string()))?;
    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(buf))
}

/// Creates, looks up and revokes sessions in the backing store.
///
/// Lookups never extend a session; expiry is absolute.
#[derive(Clone)]
pub struct SessionManager {
    store: SharedStore,
    pub ttl: Duration,
}

impl SessionManager {
    pub fn new(store: SharedStore, ttl: Duration) -> Self { Self { store, ttl } }

    pub fn create(&self, user_id: UserId, ip: Option<String>, user_agent: Option<String>) -> Result<Session, AuthError> {
        self.create_with_ttl(user_id, ip, user_agent, self.ttl)
    }

    pub fn create_with_ttl(&self, user_id: UserId, ip: Option<String>, user_agent: Option<String>, ttl: Duration) -> Result<Session, AuthError> {
        let now = Utc::now();
        let expires_at = now.checked_add_signed(ttl).ok_or(AuthError::ExpiryOutOfRange(ttl.num_seconds()))?;
        let session = Session {
            token: gen_token()?,
            user_id,
            created_at: now,
            expires_at,
            user_agent,
            ip,
        };
        self.store.insert_session(&session)?;
        tracing::debug!(target: "identity.session", user_id, expires_at = %session.expires_at, "session.issue");
        Ok(session)
    }

    pub fn lookup(&self, token: &str) -> StoreResult<Option<Session>> { self.store.session(token) }

    /// Idempotent: revoking an unknown token is not an error.
    pub fn revoke(&self, token: &str) -> StoreResult<()> {
        let removed = self.store.delete_session(token)?;
        tracing::debug!(target: "identity.session", removed, "session.revoke");
        Ok(())
    }

    pub fn revoke_all_for(&self, user_id: UserId) -> StoreResult<usize> {
        let count = self.store.delete_sessions_for_user(user_id)?;
        tracing::debug!(target: "identity.session", user_id, count, "session.revoke_user");
        Ok(count)
    }

    /// Delete every session already expired at `now`.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> StoreResult<usize> {
        let count = self.store.delete_sessions_expired_before(now)?;
        if count > 0 { tracing::info!(target: "identity.session", count, "session.purge_expired"); }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use std::collections::HashSet;
    use std::sync::Arc;

    fn manager() -> (Arc<MemoryStore>, SessionManager) {
        let store = Arc::new(MemoryStore::new());
        let sm = SessionManager::new(store.clone(), Duration::hours(24));
        (store, sm)
    }

    #[test]
    fn tokens_are_256_bit_and_distinct() {
        let tokens: HashSet<String> = (0..64).map(|_| gen_token().unwrap()).collect();
        assert_eq!(tokens.len(), 64);
        for t in &tokens {
            let raw = base64::engine::general_purpose::URL_SAFE_NO_PAD.decode(t).unwrap();
            assert_eq!(raw.len(), TOKEN_BYTES);
        }
    }

    #[test]
    fn create_sets_absolute_expiry_and_provenance() {
        let (_store, sm) = manager();
        let s = sm.create(7, Some("10.0.0.1".into()), Some("curl/8".into())).unwrap();
        assert_eq!(s.expires_at - s.created_at, Duration::hours(24));
        let found = sm.lookup(&s.token).unwrap().unwrap();
        assert_eq!(found, s);
        assert_eq!(found.ip.as_deref(), Some("10.0.0.1"));
    }

    #[test]
    fn lookup_does_not_renew() {
        let (_store, sm) = manager();
        let s = sm.create(1, None, None).unwrap();
        let a = sm.lookup(&s.token).unwrap().unwrap();
        let b = sm.lookup(&s.token).unwrap().unwrap();
        assert_eq!(a.expires_at, s.expires_at);
        assert_eq!(b.expires_at, s.expires_at);
    }

    #[test]
    fn revoke_is_idempotent() {
        let (store, sm) = manager();
        let s = sm.create(1, None, None).unwrap();
        sm.revoke(&s.token).unwrap();
        sm.revoke(&s.token).unwrap();
        sm.revoke("never-issued").unwrap();
        assert!(sm.lookup(&s.token).unwrap().is_none());
        assert_eq!(store.session_count(), 0);
    }

    #[test]
    fn concurrent_sessions_are_independent() {
        let (_store, sm) = manager();
        let a = sm.create(1, None, None).unwrap();
        let b = sm.create(1, None, None).unwrap();
        assert_ne!(a.token, b.token);
        sm.revoke(&a.token).unwrap();
        assert!(sm.lookup(&b.token).unwrap().is_some());
        assert_eq!(sm.revoke_all_for(1).unwrap(), 1);
    }

    #[test]
    fn unrepresentable_expiry_is_an_error() {
        let (store, sm) = manager();
        let err = sm.create_with_ttl(1, None, None, Duration::MAX).unwrap_err();
        assert!(matches!(err, AuthError::ExpiryOutOfRange(_)));
        assert_eq!(store.session_count(), 0);
    }

    #[test]
    fn purge_removes_only_expired_rows() {
        let (store, sm) = manager();
        let live = sm.create(1, None, None).unwrap();
        let dead = sm.create_with_ttl(2, None, None, Duration::seconds(-5)).unwrap();
        assert!(dead.is_expired_at(Utc::now()));
        assert_eq!(sm.purge_expired(Utc::now()).unwrap(), 1);
        assert!(sm.lookup(&live.token).unwrap().is_some());
        assert!(sm.lookup(&dead.token).unwrap().is_none());
        assert_eq!(store.session_count(), 1);
    }
}
