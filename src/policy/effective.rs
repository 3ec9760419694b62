//! Effective permission set produced by the resolver

use super::scope::{ResourceRef, ScopeSet};
use crate::domain::{PermissionName, ResourcePattern, UserContext};
use crate::error::AppError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Where an effective permission came from.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Provenance {
    /// Granted by the named role
    Role(String),
    /// Granted directly to the user
    UserOverride,
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provenance::Role(name) => write!(f, "role:{}", name),
            Provenance::UserOverride => f.write_str("user_override"),
        }
    }
}

impl TryFrom<String> for Provenance {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value == "user_override" {
            return Ok(Provenance::UserOverride);
        }
        match value.strip_prefix("role:") {
            Some(name) if !name.is_empty() => Ok(Provenance::Role(name.to_string())),
            _ => Err(AppError::Validation(format!("Unknown source '{}'", value))),
        }
    }
}

impl From<Provenance> for String {
    fn from(p: Provenance) -> Self {
        p.to_string()
    }
}

/// One member of the effective set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectivePermission {
    pub provenance: Provenance,
    /// Every active role that granted this permission
    pub roles: BTreeSet<String>,
    pub scope: ScopeSet,
}

impl EffectivePermission {
    pub(crate) fn from_role(role_name: &str, pattern: ResourcePattern) -> Self {
        Self {
            provenance: Provenance::Role(role_name.to_string()),
            roles: BTreeSet::from([role_name.to_string()]),
            scope: ScopeSet::of(pattern),
        }
    }

    pub(crate) fn from_override(pattern: ResourcePattern) -> Self {
        Self {
            provenance: Provenance::UserOverride,
            roles: BTreeSet::new(),
            scope: ScopeSet::of(pattern),
        }
    }
}

/// Row shape exposed to callers that expect `{permission_name, granted, source}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionRow {
    pub permission_name: PermissionName,
    pub granted: bool,
    pub source: Provenance,
}

/// Final permission set for one user
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EffectivePermissions {
    entries: BTreeMap<PermissionName, EffectivePermission>,
}

impl EffectivePermissions {
    /// The default-deny set.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn contains(&self, name: PermissionName) -> bool {
        self.entries.contains_key(&name)
    }

    pub fn get(&self, name: PermissionName) -> Option<&EffectivePermission> {
        self.entries.get(&name)
    }

    pub fn names(&self) -> impl Iterator<Item = PermissionName> + '_ {
        self.entries.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PermissionName, &EffectivePermission)> {
        self.entries.iter()
    }

    pub fn to_rows(&self) -> Vec<PermissionRow> {
        self.entries
            .iter()
            .map(|(name, entry)| PermissionRow {
                permission_name: *name,
                granted: true,
                source: entry.provenance.clone(),
            })
            .collect()
    }

    /// Whether `permission` is held and its scope covers `resource`.
    pub fn in_scope(
        &self,
        permission: PermissionName,
        resource: &ResourceRef,
        user: &UserContext,
    ) -> bool {
        self.entries
            .get(&permission)
            .is_some_and(|entry| entry.scope.covers(resource, user))
    }

    /// Record a role grant. The first role to grant a permission keeps the
    /// provenance; later roles only widen the scope.
    pub(crate) fn add_role_grant(
        &mut self,
        name: PermissionName,
        role_name: &str,
        pattern: ResourcePattern,
    ) {
        self.entries
            .entry(name)
            .and_modify(|entry| {
                entry.roles.insert(role_name.to_string());
                entry.scope.widen(pattern);
            })
            .or_insert_with(|| EffectivePermission::from_role(role_name, pattern));
    }

    pub(crate) fn apply_grant_override(&mut self, name: PermissionName, pattern: ResourcePattern) {
        self.entries
            .entry(name)
            .and_modify(|entry| {
                entry.provenance = Provenance::UserOverride;
                entry.scope.widen(pattern);
            })
            .or_insert_with(|| EffectivePermission::from_override(pattern));
    }

    pub(crate) fn apply_revoke_override(&mut self, name: PermissionName) {
        self.entries.remove(&name);
    }
}

impl FromIterator<(PermissionName, EffectivePermission)> for EffectivePermissions {
    fn from_iter<I: IntoIterator<Item = (PermissionName, EffectivePermission)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}
