use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use super::{IdentityStore, StoreError, StoreResult, UniqueKey, UnitOfWork, UserId, UserRow, WriteOp};
use crate::identity::{ExpertProfile, Session, VolunteerProfile};

#[derive(Debug, Default)]
struct Tables {
    users: BTreeMap<UserId, UserRow>,
    usernames: HashMap<String, UserId>,
    emails: HashMap<String, UserId>,
    volunteers: BTreeMap<UserId, VolunteerProfile>,
    experts: BTreeMap<UserId, ExpertProfile>,
    sessions: HashMap<String, Session>,
}

/// Inverse of one applied write, replayed newest-first on rollback.
enum Undo {
    RemoveUser(UserId),
    RestoreUser(UserRow),
    RemoveVolunteer(UserId),
    RemoveExpert(UserId),
}

impl Tables {
    fn index_user(&mut self, row: &UserRow) {
        self.usernames.insert(row.username.clone(), row.id);
        if let Some(email) = &row.email { self.emails.insert(email.clone(), row.id); }
    }

    fn unindex_user(&mut self, row: &UserRow) {
        self.usernames.remove(&row.username);
        if let Some(email) = &row.email { self.emails.remove(email); }
    }

    fn check_unique(&self, row: &UserRow) -> StoreResult<()> {
        if matches!(self.usernames.get(&row.username), Some(owner) if *owner != row.id) {
            return Err(StoreError::UniqueViolation(UniqueKey::Username(row.username.clone())));
        }
        if let Some(email) = &row.email {
            if matches!(self.emails.get(email), Some(owner) if *owner != row.id) {
                return Err(StoreError::UniqueViolation(UniqueKey::Email(email.clone())));
            }
        }
        Ok(())
    }

    fn apply(&mut self, op: WriteOp) -> StoreResult<Undo> {
        match op {
            WriteOp::InsertUser(row) => {
                if self.users.contains_key(&row.id) {
                    return Err(StoreError::UniqueViolation(UniqueKey::UserId(row.id)));
                }
                self.check_unique(&row)?;
                self.index_user(&row);
                let id = row.id;
                self.users.insert(id, row);
                Ok(Undo::RemoveUser(id))
            }
            WriteOp::UpdateUser(row) => {
                let Some(old) = self.users.get(&row.id).cloned() else {
                    return Err(StoreError::NotFound(format!("users.id={}", row.id)));
                };
                self.check_unique(&row)?;
                self.unindex_user(&old);
                self.index_user(&row);
                self.users.insert(row.id, row);
                Ok(Undo::RestoreUser(old))
            }
            WriteOp::InsertVolunteerProfile(p) => {
                let uid = p.user_id;
                if !self.users.contains_key(&uid) {
                    return Err(StoreError::ForeignKeyViolation(format!("volunteer_profiles.user_id={uid}")));
                }
                if self.volunteers.contains_key(&uid) {
                    return Err(StoreError::UniqueViolation(UniqueKey::VolunteerProfile(uid)));
                }
                self.volunteers.insert(uid, p);
                Ok(Undo::RemoveVolunteer(uid))
            }
            WriteOp::InsertExpertProfile(p) => {
                let uid = p.user_id;
                if !self.users.contains_key(&uid) {
                    return Err(StoreError::ForeignKeyViolation(format!("expert_profiles.user_id={uid}")));
                }
                if self.experts.contains_key(&uid) {
                    return Err(StoreError::UniqueViolation(UniqueKey::ExpertProfile(uid)));
                }
                self.experts.insert(uid, p);
                Ok(Undo::RemoveExpert(uid))
            }
        }
    }

    fn undo(&mut self, undo: Undo) {
        match undo {
            Undo::RemoveUser(id) => {
                if let Some(row) = self.users.remove(&id) { self.unindex_user(&row); }
            }
            Undo::RestoreUser(old) => {
                if let Some(current) = self.users.remove(&old.id) { self.unindex_user(&current); }
                self.index_user(&old);
                self.users.insert(old.id, old);
            }
            Undo::RemoveVolunteer(id) => { self.volunteers.remove(&id); }
            Undo::RemoveExpert(id) => { self.experts.remove(&id); }
        }
    }
}

/// In-process store with the constraints of the relational schema:
/// unique usernames, emails and session tokens, profile foreign keys, and
/// profile cascade on user delete.
///
/// A commit holds the write lock for its whole duration, so concurrent
/// commits are serialized and a uniqueness loser always sees the winner's rows.
#[derive(Debug)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    next_id: AtomicI64,
}

impl Default for MemoryStore {
    fn default() -> Self { Self::new() }
}

impl MemoryStore {
    pub fn new() -> Self { Self { tables: RwLock::new(Tables::default()), next_id: AtomicI64::new(1) } }

    pub fn user_count(&self) -> usize { self.tables.read().users.len() }
    pub fn session_count(&self) -> usize { self.tables.read().sessions.len() }
    pub fn profile_counts(&self) -> (usize, usize) {
        let t = self.tables.read();
        (t.volunteers.len(), t.experts.len())
    }

    /// Overwrite the raw roles column of a user, bypassing validation.
    /// Used to reproduce rows written by older schema versions.
    pub fn set_raw_roles(&self, id: UserId, raw: Option<String>) -> StoreResult<()> {
        let mut t = self.tables.write();
        let row = t.users.get_mut(&id).ok_or_else(|| StoreError::NotFound(format!("users.id={id}")))?;
        row.roles = raw;
        Ok(())
    }
}

impl IdentityStore for MemoryStore {
    fn next_user_id(&self) -> StoreResult<UserId> { Ok(self.next_id.fetch_add(1, Ordering::SeqCst)) }

    fn commit(&self, work: UnitOfWork) -> StoreResult<()> {
        let mut t = self.tables.write();
        let mut applied: Vec<Undo> = Vec::with_capacity(work.ops().len());
        for op in work.into_ops() {
            match t.apply(op) {
                Ok(undo) => applied.push(undo),
                Err(e) => {
                    while let Some(undo) = applied.pop() { t.undo(undo); }
                    tracing::debug!(target: "storage.memory", error = %e, "commit rolled back");
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    fn user_by_id(&self, id: UserId) -> StoreResult<Option<UserRow>> { Ok(self.tables.read().users.get(&id).cloned()) }

    fn user_by_username(&self, username: &str) -> StoreResult<Option<UserRow>> {
        let t = self.tables.read();
        Ok(t.usernames.get(username).and_then(|id| t.users.get(id)).cloned())
    }

    fn volunteer_profile(&self, user_id: UserId) -> StoreResult<Option<VolunteerProfile>> {
        Ok(self.tables.read().volunteers.get(&user_id).cloned())
    }

    fn expert_profile(&self, user_id: UserId) -> StoreResult<Option<ExpertProfile>> {
        Ok(self.tables.read().experts.get(&user_id).cloned())
    }

    fn delete_user(&self, id: UserId) -> StoreResult<bool> {
        let mut t = self.tables.write();
        let Some(row) = t.users.remove(&id) else { return Ok(false); };
        t.unindex_user(&row);
        t.volunteers.remove(&id);
        t.experts.remove(&id);
        Ok(true)
    }

    fn insert_session(&self, session: &Session) -> StoreResult<()> {
        let mut t = self.tables.write();
        if t.sessions.contains_key(&session.token) {
            return Err(StoreError::UniqueViolation(UniqueKey::SessionToken));
        }
        t.sessions.insert(session.token.clone(), session.clone());
        Ok(())
    }

    fn session(&self, token: &str) -> StoreResult<Option<Session>> { Ok(self.tables.read().sessions.get(token).cloned()) }

    fn delete_session(&self, token: &str) -> StoreResult<bool> { Ok(self.tables.write().sessions.remove(token).is_some()) }

    fn delete_sessions_for_user(&self, user_id: UserId) -> StoreResult<usize> {
        let mut t = self.tables.write();
        let before = t.sessions.len();
        t.sessions.retain(|_, s| s.user_id != user_id);
        Ok(before - t.sessions.len())
    }

    fn delete_sessions_expired_before(&self, cutoff: DateTime<Utc>) -> StoreResult<usize> {
        let mut t = self.tables.write();
        let before = t.sessions.len();
        t.sessions.retain(|_, s| s.expires_at >= cutoff);
        Ok(before - t.sessions.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{AccountStatus, Gender, ReviewStatus, WorkStatus};

    fn user(store: &MemoryStore, username: &str, email: Option<&str>) -> UserRow {
        let now = Utc::now();
        UserRow {
            id: store.next_user_id().unwrap(),
            username: username.to_string(),
            email: email.map(str::to_string),
            password_hash: "$argon2id$placeholder".to_string(),
            nickname: None,
            avatar: None,
            gender: Gender::Hidden,
            roles: Some(r#"["volunteer"]"#.to_string()),
            status: AccountStatus::Active,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    fn volunteer(user_id: UserId) -> VolunteerProfile {
        VolunteerProfile {
            user_id,
            full_name: "V".into(),
            phone: None,
            public_email: None,
            is_public_visible: false,
            service_hours: 0,
            skills: vec![],
            status: ReviewStatus::Pending,
            work_status: WorkStatus::Offline,
        }
    }

    #[test]
    fn commit_applies_all_rows() {
        let store = MemoryStore::new();
        let row = user(&store, "ann", Some("ann@example.com"));
        let id = row.id;
        let mut work = UnitOfWork::new();
        work.insert_user(row).insert_volunteer_profile(volunteer(id));
        store.commit(work).unwrap();
        assert!(store.user_by_username("ann").unwrap().is_some());
        assert!(store.volunteer_profile(id).unwrap().is_some());
    }

    #[test]
    fn failed_op_rolls_back_earlier_ops() {
        let store = MemoryStore::new();
        let row = user(&store, "bob", None);
        let mut work = UnitOfWork::new();
        // profile points at a user that is not part of this work
        work.insert_user(row).insert_volunteer_profile(volunteer(999));
        let err = store.commit(work).unwrap_err();
        assert!(matches!(err, StoreError::ForeignKeyViolation(_)));
        assert!(store.user_by_username("bob").unwrap().is_none());
        assert_eq!(store.user_count(), 0);
        assert_eq!(store.profile_counts(), (0, 0));
    }

    #[test]
    fn username_and_email_are_unique() {
        let store = MemoryStore::new();
        let mut w = UnitOfWork::new();
        w.insert_user(user(&store, "cat", Some("c@example.com")));
        store.commit(w).unwrap();

        let mut w = UnitOfWork::new();
        w.insert_user(user(&store, "cat", None));
        assert_eq!(store.commit(w).unwrap_err(), StoreError::UniqueViolation(UniqueKey::Username("cat".into())));

        let mut w = UnitOfWork::new();
        w.insert_user(user(&store, "cat2", Some("c@example.com")));
        assert_eq!(store.commit(w).unwrap_err(), StoreError::UniqueViolation(UniqueKey::Email("c@example.com".into())));
        assert_eq!(store.user_count(), 1);
    }

    #[test]
    fn update_reindexes_and_restores_on_failure() {
        let store = MemoryStore::new();
        let a = user(&store, "dan", None);
        let b = user(&store, "eve", None);
        let mut w = UnitOfWork::new();
        w.insert_user(a.clone()).insert_user(b.clone());
        store.commit(w).unwrap();

        let mut renamed = a.clone();
        renamed.username = "daniel".into();
        let mut w = UnitOfWork::new();
        w.update_user(renamed);
        store.commit(w).unwrap();
        assert!(store.user_by_username("dan").unwrap().is_none());
        assert_eq!(store.user_by_username("daniel").unwrap().unwrap().id, a.id);

        // second op collides; the first rename must be undone
        let mut first = b.clone();
        first.username = "evelyn".into();
        let mut clash = b.clone();
        clash.username = "daniel".into();
        let mut w = UnitOfWork::new();
        w.update_user(first).update_user(clash);
        assert!(store.commit(w).is_err());
        assert_eq!(store.user_by_username("eve").unwrap().unwrap().id, b.id);
        assert!(store.user_by_username("evelyn").unwrap().is_none());
    }

    #[test]
    fn delete_cascades_profiles() {
        let store = MemoryStore::new();
        let row = user(&store, "fay", None);
        let id = row.id;
        let mut w = UnitOfWork::new();
        w.insert_user(row).insert_volunteer_profile(volunteer(id));
        store.commit(w).unwrap();
        assert!(store.delete_user(id).unwrap());
        assert!(!store.delete_user(id).unwrap());
        assert!(store.volunteer_profile(id).unwrap().is_none());
        assert!(store.user_by_username("fay").unwrap().is_none());
    }
}
