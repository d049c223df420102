//! Role vocabulary and the role set carried by every principal.
//!
//! Roles are persisted as a JSON array of lowercase tags in a text column.
//! The column is decoded on every read; anything other than a list of known
//! tags is surfaced as [`StoredRoles::Malformed`] instead of being coerced.

use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Family,
    Volunteer,
    Expert,
    Admin,
    Maintainer,
}

impl Role {
    pub const ALL: [Role; 5] = [Role::Family, Role::Volunteer, Role::Expert, Role::Admin, Role::Maintainer];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Family => "family",
            Role::Volunteer => "volunteer",
            Role::Expert => "expert",
            Role::Admin => "admin",
            Role::Maintainer => "maintainer",
        }
    }

    /// Roles that public registration can never grant.
    pub fn is_privileged(&self) -> bool { matches!(self, Role::Admin | Role::Maintainer) }
}

impl Display for Role {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result { f.write_str(self.as_str()) }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownRole(pub String);

impl Display for UnknownRole {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result { write!(f, "unknown role '{}'", self.0) }
}

impl std::error::Error for UnknownRole {}

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| UnknownRole(s.to_string()))
    }
}

/// Unordered set of roles. Serialized as a sorted JSON list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleSet(BTreeSet<Role>);

impl RoleSet {
    pub fn new() -> Self { Self(BTreeSet::new()) }

    pub fn contains(&self, role: Role) -> bool { self.0.contains(&role) }
    pub fn insert(&mut self, role: Role) -> bool { self.0.insert(role) }
    pub fn remove(&mut self, role: Role) -> bool { self.0.remove(&role) }
    pub fn is_empty(&self) -> bool { self.0.is_empty() }
    pub fn len(&self) -> usize { self.0.len() }
    pub fn iter(&self) -> impl Iterator<Item = Role> + '_ { self.0.iter().copied() }

    pub fn intersects(&self, other: &RoleSet) -> bool { self.0.intersection(&other.0).next().is_some() }

    pub fn privileged(&self) -> RoleSet { self.iter().filter(Role::is_privileged).collect() }

    /// Encode for the roles text column.
    pub fn encode(&self) -> String {
        let tags: Vec<&str> = self.iter().map(|r| r.as_str()).collect();
        serde_json::to_string(&tags).unwrap_or_else(|_| "[]".to_string())
    }
}

impl FromIterator<Role> for RoleSet {
    fn from_iter<I: IntoIterator<Item = Role>>(iter: I) -> Self { Self(iter.into_iter().collect()) }
}

impl<const N: usize> From<[Role; N]> for RoleSet {
    fn from(roles: [Role; N]) -> Self { roles.into_iter().collect() }
}

impl Display for RoleSet {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let tags: Vec<&str> = self.iter().map(|r| r.as_str()).collect();
        write!(f, "[{}]", tags.join(", "))
    }
}

/// Decoded state of a persisted roles column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoredRoles {
    Valid(RoleSet),
    /// Column was NULL.
    Missing,
    /// Column held something other than a JSON list of known role tags.
    Malformed { raw: String, reason: String },
}

impl StoredRoles {
    pub fn decode(column: Option<&str>) -> StoredRoles {
        let Some(raw) = column else { return StoredRoles::Missing; };
        let malformed = |reason: String| StoredRoles::Malformed { raw: raw.to_string(), reason };
        let value: serde_json::Value = match serde_json::from_str(raw) {
            Ok(v) => v,
            Err(e) => return malformed(format!("not json: {e}")),
        };
        let items = match value {
            serde_json::Value::Array(items) => items,
            serde_json::Value::Null => return StoredRoles::Missing,
            other => return malformed(format!("expected a list, found {}", json_kind(&other))),
        };
        let mut set = RoleSet::new();
        for item in items {
            let Some(tag) = item.as_str() else { return malformed(format!("non-string entry {item}")); };
            match tag.parse::<Role>() {
                Ok(role) => { set.insert(role); }
                Err(e) => return malformed(e.to_string()),
            }
        }
        StoredRoles::Valid(set)
    }

    pub fn as_set(&self) -> Option<&RoleSet> {
        match self {
            StoredRoles::Valid(set) => Some(set),
            _ => None,
        }
    }
}

fn json_kind(v: &serde_json::Value) -> &'static str {
    match v {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
