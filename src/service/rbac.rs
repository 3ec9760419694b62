//! Role and override administration

use crate::domain::{
    AssignRoleInput, CreateRoleInput, Module, PermissionLevel, PermissionName,
    PermissionOverrideInput, ProfileRole, Role, RoleAssignment, RoleGrant, StringUuid, UpdateRolePermissionsInput,
    UserPermission, UserRole,
};
use crate::error::{AppError, Result};
use crate::policy::catalog;
use crate::repository::RbacRepository;
use std::collections::BTreeMap;
use std::sync::Arc;
use validator::Validate;

pub struct RbacService<R: RbacRepository> {
    repo: Arc<R>,
}

impl<R: RbacRepository> RbacService<R> {
    pub fn new(repo: Arc<R>) -> Self {
        Self { repo }
    }

    // ==================== Roles ====================

    pub async fn create_role(
        &self,
        input: CreateRoleInput,
        created_by: Option<StringUuid>,
    ) -> Result<Role> {
        input.validate()?;
        let grants = grants_for_levels(&input.levels);
        let role = self.repo.create_role(&input, &grants, created_by).await?;
        tracing::info!(role_id = %role.id, name = %role.name, grants = grants.len(), "Created role");
        Ok(role)
    }

    pub async fn get_role(&self, id: StringUuid) -> Result<Role> {
        self.repo
            .find_role_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Role {} not found", id)))
    }

    pub async fn list_roles(&self, organization_id: StringUuid) -> Result<Vec<Role>> {
        self.repo.list_roles(organization_id).await
    }

    /// Replace the role's module levels, and its name/description if given.
    pub async fn set_role_levels(
        &self,
        id: StringUuid,
        input: UpdateRolePermissionsInput,
    ) -> Result<Role> {
        input.validate()?;
        let existing = self.get_role(id).await?;
        if !existing.is_active {
            return Err(AppError::NotFound(format!("Role {} not found", id)));
        }

        let grants = grants_for_levels(&input.levels);
        let role = self.repo.update_role(id, &input, &grants).await?;
        tracing::info!(role_id = %id, modules = input.levels.len(), "Updated role levels");
        Ok(role)
    }

    /// Soft delete. Assignments stay but grant nothing once the role is inactive.
    pub async fn delete_role(&self, id: StringUuid) -> Result<()> {
        let role = self.get_role(id).await?;
        if role.is_system {
            return Err(AppError::Forbidden(format!(
                "System role '{}' cannot be deleted",
                role.name
            )));
        }
        self.repo.deactivate_role(id).await?;
        tracing::info!(role_id = %id, name = %role.name, "Deactivated role");
        Ok(())
    }

    /// Per-module level as a role editor displays it.
    pub async fn role_levels(&self, id: StringUuid) -> Result<BTreeMap<Module, PermissionLevel>> {
        let _ = self.get_role(id).await?;
        let granted: Vec<PermissionName> = self
            .repo
            .list_granted_permissions_for_role(id)
            .await?
            .into_iter()
            .filter(|g| g.granted)
            .map(|g| g.permission)
            .collect();

        Ok(Module::ALL
            .into_iter()
            .filter_map(|module| {
                catalog()
                    .level_of(module, granted.iter().copied())
                    .map(|level| (module, level))
            })
            .collect())
    }

    // ==================== User Roles ====================

    /// Active assignments, including ones past their expiry, for admin views.
    pub async fn list_user_roles(&self, user_id: StringUuid) -> Result<Vec<RoleAssignment>> {
        self.repo.list_user_roles(user_id).await
    }

    /// Add a role alongside the user's existing ones.
    pub async fn assign_role(
        &self,
        input: AssignRoleInput,
        assigned_by: Option<StringUuid>,
    ) -> Result<UserRole> {
        input.validate()?;
        self.require_active_role(input.role_id.into()).await?;
        let assignment = self.repo.assign_role_to_user(&input, assigned_by).await?;
        tracing::info!(user_id = %input.user_id, role_id = %input.role_id, "Assigned role");
        Ok(assignment)
    }

    /// Make `input.role_id` the user's only active role.
    ///
    /// Runs as one unit in the store, so readers see either the old roles
    /// or the new one.
    pub async fn reassign_role(
        &self,
        input: AssignRoleInput,
        assigned_by: Option<StringUuid>,
    ) -> Result<UserRole> {
        input.validate()?;
        self.require_active_role(input.role_id.into()).await?;
        let assignment = self.repo.replace_user_roles(&input, assigned_by).await?;
        tracing::info!(user_id = %input.user_id, role_id = %input.role_id, "Reassigned role");
        Ok(assignment)
    }

    /// Reassign to the system role backing a profile role.
    pub async fn reassign_profile_role(
        &self,
        user_id: StringUuid,
        organization_id: StringUuid,
        profile_role: ProfileRole,
        assigned_by: Option<StringUuid>,
    ) -> Result<UserRole> {
        let role = self
            .repo
            .find_system_role(organization_id, profile_role.system_role_name())
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "System role '{}' not found in organization {}",
                    profile_role.system_role_name(),
                    organization_id
                ))
            })?;

        let input = AssignRoleInput {
            user_id: user_id.into(),
            role_id: role.id.into(),
            expires_at: None,
        };
        self.reassign_role(input, assigned_by).await
    }

    pub async fn remove_role(&self, user_id: StringUuid, role_id: StringUuid) -> Result<()> {
        self.repo.deactivate_user_role(user_id, role_id).await?;
        tracing::info!(user_id = %user_id, role_id = %role_id, "Removed role");
        Ok(())
    }

    // ==================== Overrides ====================

    pub async fn list_user_overrides(&self, user_id: StringUuid) -> Result<Vec<UserPermission>> {
        self.repo.list_user_overrides(user_id).await
    }

    pub async fn grant_override(
        &self,
        input: PermissionOverrideInput,
        assigned_by: Option<StringUuid>,
    ) -> Result<UserPermission> {
        self.store_override(input, true, assigned_by).await
    }

    pub async fn revoke_override(
        &self,
        input: PermissionOverrideInput,
        assigned_by: Option<StringUuid>,
    ) -> Result<UserPermission> {
        self.store_override(input, false, assigned_by).await
    }

    /// Drop the override so role grants apply again.
    pub async fn clear_override(&self, user_id: StringUuid, permission: PermissionName) -> Result<()> {
        self.repo.delete_override(user_id, permission).await?;
        tracing::info!(user_id = %user_id, permission = %permission, "Cleared override");
        Ok(())
    }

    async fn store_override(
        &self,
        input: PermissionOverrideInput,
        granted: bool,
        assigned_by: Option<StringUuid>,
    ) -> Result<UserPermission> {
        input.validate()?;
        let stored = self.repo.upsert_override(&input, granted, assigned_by).await?;
        tracing::info!(
            user_id = %input.user_id,
            permission = %input.permission,
            granted,
            "Stored permission override"
        );
        Ok(stored)
    }

    async fn require_active_role(&self, id: StringUuid) -> Result<Role> {
        let role = self.get_role(id).await?;
        if !role.is_active {
            return Err(AppError::BadRequest(format!(
                "Role '{}' is inactive",
                role.name
            )));
        }
        Ok(role)
    }
}

/// Catalog grants for a role editor's module levels.
pub fn grants_for_levels(levels: &BTreeMap<Module, PermissionLevel>) -> Vec<RoleGrant> {
    levels
        .iter()
        .flat_map(|(module, level)| catalog().expand_level(*module, *level))
        .filter_map(|name| catalog().get(name))
        .map(|permission| RoleGrant {
            permission: permission.name,
            resource_pattern: permission.resource_pattern,
            granted: true,
        })
        .collect()
}
