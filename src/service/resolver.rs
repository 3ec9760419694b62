//! Effective permission resolution
//!
//! Merges a user's active roles and unexpired overrides into one
//! [`EffectivePermissions`]. Overrides dominate roles in both directions;
//! a revoking override for a name beats any grant of it.

use crate::domain::{RoleAssignment, Session, StringUuid, UserPermission};
use crate::error::{AppError, Result};
use crate::policy::{Capabilities, EffectivePermissions};
use crate::repository::RbacRepository;
use crate::telemetry::metrics::RESOLUTIONS_TOTAL;
use chrono::{DateTime, Utc};
use std::sync::Arc;

pub struct PermissionResolver<R: RbacRepository> {
    repo: Arc<R>,
}

impl<R: RbacRepository> Clone for PermissionResolver<R> {
    fn clone(&self) -> Self {
        Self {
            repo: self.repo.clone(),
        }
    }
}

impl<R: RbacRepository> PermissionResolver<R> {
    pub fn new(repo: Arc<R>) -> Self {
        Self { repo }
    }

    /// Resolve against the current time.
    ///
    /// An unknown user resolves to the empty set. A store failure is
    /// reported as [`AppError::StoreUnavailable`]; callers must treat it as
    /// "no permissions".
    pub async fn resolve(&self, user_id: StringUuid) -> Result<EffectivePermissions> {
        self.resolve_at(user_id, Utc::now()).await
    }

    pub async fn resolve_at(
        &self,
        user_id: StringUuid,
        now: DateTime<Utc>,
    ) -> Result<EffectivePermissions> {
        let result = self.compute(user_id, now).await;

        let outcome = match &result {
            Ok(_) => "resolved",
            Err(_) => "store_unavailable",
        };
        metrics::counter!(RESOLUTIONS_TOTAL, "outcome" => outcome).increment(1);

        match &result {
            Ok(permissions) => tracing::debug!(
                user_id = %user_id,
                permissions = permissions.len(),
                "Resolved effective permissions"
            ),
            Err(e) => tracing::warn!(
                user_id = %user_id,
                error = %e,
                "Permission resolution failed, denying"
            ),
        }

        result
    }

    /// Fail-closed variant: any failure yields the empty set.
    pub async fn resolve_or_deny(&self, user_id: StringUuid) -> EffectivePermissions {
        self.resolve(user_id).await.unwrap_or_default()
    }

    /// No session resolves to the empty set without touching the store.
    pub async fn resolve_session(&self, session: Option<&Session>) -> Result<EffectivePermissions> {
        match session {
            Some(session) => self.resolve(session.user_id).await,
            None => Ok(EffectivePermissions::empty()),
        }
    }

    pub async fn has_permission(&self, user_id: StringUuid, name: &str) -> Result<bool> {
        Ok(self.resolve(user_id).await?.has_permission(name))
    }

    async fn compute(&self, user_id: StringUuid, now: DateTime<Utc>) -> Result<EffectivePermissions> {
        let assignments = self
            .repo
            .list_active_roles_for_user(user_id)
            .await
            .map_err(store_unavailable)?;

        let mut permissions = EffectivePermissions::empty();
        for assignment in effective_assignments(assignments, user_id, now) {
            let grants = self
                .repo
                .list_granted_permissions_for_role(assignment.role.id)
                .await
                .map_err(store_unavailable)?;

            for grant in grants.into_iter().filter(|g| g.granted) {
                permissions.add_role_grant(
                    grant.permission,
                    &assignment.role.name,
                    grant.resource_pattern,
                );
            }
        }

        let overrides = self
            .repo
            .list_active_overrides_for_user(user_id)
            .await
            .map_err(store_unavailable)?;

        for entry in effective_overrides(overrides, user_id, now) {
            if entry.granted {
                permissions.apply_grant_override(entry.permission, entry.resource_pattern);
            } else {
                permissions.apply_revoke_override(entry.permission);
            }
        }

        Ok(permissions)
    }
}

/// Live assignments, one per role, ordered by role name so the first
/// granting role is stable.
fn effective_assignments(
    mut assignments: Vec<RoleAssignment>,
    user_id: StringUuid,
    now: DateTime<Utc>,
) -> Vec<RoleAssignment> {
    assignments.retain(|a| a.assignment.user_id == user_id && a.is_effective_at(now));
    assignments.sort_by(|a, b| {
        a.role
            .name
            .cmp(&b.role.name)
            .then_with(|| a.role.id.cmp(&b.role.id))
    });
    assignments.dedup_by_key(|a| a.role.id);
    assignments
}

/// Unexpired overrides with grants ahead of revocations.
fn effective_overrides(
    mut overrides: Vec<UserPermission>,
    user_id: StringUuid,
    now: DateTime<Utc>,
) -> Vec<UserPermission> {
    overrides.retain(|o| o.user_id == user_id && o.is_effective_at(now));
    overrides.sort_by_key(|o| !o.granted);
    overrides
}

fn store_unavailable(err: AppError) -> AppError {
    match err {
        AppError::StoreUnavailable(_) => err,
        other => AppError::StoreUnavailable(other.to_string()),
    }
}
