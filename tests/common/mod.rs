//! Common test utilities

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kroolo_authz::domain::{
    AssignRoleInput, CreateRoleInput, PermissionName, PermissionOverrideInput, ProfileRole,
    ResourcePattern, Role, RoleAssignment, RoleGrant, Session, StringUuid,
    UpdateRolePermissionsInput, UserPermission, UserRole,
};
use kroolo_authz::error::{AppError, Result};
use kroolo_authz::policy::catalog;
use kroolo_authz::repository::RbacRepository;
use kroolo_authz::service::{PermissionResolver, RbacService};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

// ============================================================================
// In-memory RBAC store
// ============================================================================

/// Behaves like the SQL store: NULL edge patterns fall back to the catalog
/// pattern, and user role replacement happens under one lock.
pub struct TestRbacRepository {
    roles: RwLock<Vec<Role>>,
    grants: RwLock<Vec<(StringUuid, RoleGrant)>>,
    user_roles: RwLock<Vec<UserRole>>,
    overrides: RwLock<Vec<UserPermission>>,
    unavailable: AtomicBool,
    grant_writes_unavailable: AtomicBool,
}

impl TestRbacRepository {
    pub fn new() -> Self {
        Self {
            roles: RwLock::new(vec![]),
            grants: RwLock::new(vec![]),
            user_roles: RwLock::new(vec![]),
            overrides: RwLock::new(vec![]),
            unavailable: AtomicBool::new(false),
            grant_writes_unavailable: AtomicBool::new(false),
        }
    }

    /// Make every call fail as if the database were down.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Fail role grant writes only, after the role row itself was touched.
    pub fn set_grant_writes_unavailable(&self, unavailable: bool) {
        self.grant_writes_unavailable
            .store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(AppError::Database(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }

    /// Insert a role with explicit grants, bypassing the service layer.
    pub async fn add_role(
        &self,
        organization_id: StringUuid,
        name: &str,
        is_system: bool,
        grants: Vec<RoleGrant>,
    ) -> Role {
        let role = Role {
            organization_id,
            name: name.to_string(),
            is_system,
            ..Default::default()
        };
        self.roles.write().await.push(role.clone());
        self.grants
            .write()
            .await
            .extend(grants.into_iter().map(|g| (role.id, g)));
        role
    }

    /// Insert an assignment directly, including already-expired ones.
    pub async fn add_user_role(
        &self,
        user_id: StringUuid,
        role_id: StringUuid,
        expires_at: Option<DateTime<Utc>>,
    ) -> UserRole {
        let user_role = UserRole {
            id: StringUuid::new_v4(),
            user_id,
            role_id,
            assigned_by: None,
            assigned_at: Utc::now(),
            expires_at,
            is_active: true,
        };
        self.user_roles.write().await.push(user_role.clone());
        user_role
    }

    /// Insert an override directly, including already-expired ones.
    pub async fn add_override(
        &self,
        user_id: StringUuid,
        permission: PermissionName,
        resource_pattern: ResourcePattern,
        granted: bool,
        expires_at: Option<DateTime<Utc>>,
    ) {
        let mut overrides = self.overrides.write().await;
        overrides.retain(|o| !(o.user_id == user_id && o.permission == permission));
        overrides.push(UserPermission {
            id: StringUuid::new_v4(),
            user_id,
            permission,
            resource_pattern,
            granted,
            assigned_by: None,
            assigned_at: Utc::now(),
            expires_at,
            reason: None,
        });
    }

    pub async fn active_role_ids(&self, user_id: StringUuid) -> Vec<StringUuid> {
        self.user_roles
            .read()
            .await
            .iter()
            .filter(|ur| ur.user_id == user_id && ur.is_active)
            .map(|ur| ur.role_id)
            .collect()
    }

    pub async fn seed_system_roles(&self, organization_id: StringUuid) -> Vec<Role> {
        let mut seeded = vec![];
        for profile_role in ProfileRole::ALL {
            let grants = kroolo_authz::service::rbac::grants_for_levels(
                &kroolo_authz::policy::system_role_levels(profile_role),
            );
            seeded.push(
                self.add_role(
                    organization_id,
                    profile_role.system_role_name(),
                    true,
                    grants,
                )
                .await,
            );
        }
        seeded
    }
}

impl Default for TestRbacRepository {
    fn default() -> Self {
        Self::new()
    }
}

fn stored_pattern(permission: PermissionName, pattern: ResourcePattern) -> ResourcePattern {
    match pattern {
        ResourcePattern::None => catalog()
            .get(permission)
            .map(|p| p.resource_pattern)
            .unwrap_or(ResourcePattern::None),
        other => other,
    }
}

#[async_trait]
impl RbacRepository for TestRbacRepository {
    async fn list_active_roles_for_user(&self, user_id: StringUuid) -> Result<Vec<RoleAssignment>> {
        self.check_available()?;
        let now = Utc::now();
        let roles = self.roles.read().await;
        let user_roles = self.user_roles.read().await;
        Ok(user_roles
            .iter()
            .filter(|ur| ur.user_id == user_id && ur.is_effective_at(now))
            .filter_map(|ur| {
                roles.iter().find(|r| r.id == ur.role_id).map(|role| RoleAssignment {
                    assignment: ur.clone(),
                    role: role.clone(),
                })
            })
            .collect())
    }

    async fn list_granted_permissions_for_role(
        &self,
        role_id: StringUuid,
    ) -> Result<Vec<RoleGrant>> {
        self.check_available()?;
        let grants = self.grants.read().await;
        Ok(grants
            .iter()
            .filter(|(id, grant)| *id == role_id && grant.granted)
            .map(|(_, grant)| RoleGrant {
                resource_pattern: stored_pattern(grant.permission, grant.resource_pattern),
                ..*grant
            })
            .collect())
    }

    async fn list_active_overrides_for_user(
        &self,
        user_id: StringUuid,
    ) -> Result<Vec<UserPermission>> {
        self.check_available()?;
        let now = Utc::now();
        let overrides = self.overrides.read().await;
        Ok(overrides
            .iter()
            .filter(|o| o.user_id == user_id && o.is_effective_at(now))
            .map(|o| UserPermission {
                resource_pattern: stored_pattern(o.permission, o.resource_pattern),
                ..o.clone()
            })
            .collect())
    }

    async fn create_role(
        &self,
        input: &CreateRoleInput,
        grants: &[RoleGrant],
        created_by: Option<StringUuid>,
    ) -> Result<Role> {
        self.check_available()?;
        let role = Role {
            organization_id: input.organization_id.into(),
            name: input.name.clone(),
            description: input.description.clone(),
            created_by,
            ..Default::default()
        };
        self.roles.write().await.push(role.clone());
        self.grants
            .write()
            .await
            .extend(grants.iter().map(|g| (role.id, *g)));
        Ok(role)
    }

    async fn find_role_by_id(&self, id: StringUuid) -> Result<Option<Role>> {
        self.check_available()?;
        let roles = self.roles.read().await;
        Ok(roles.iter().find(|r| r.id == id).cloned())
    }

    async fn find_system_role(
        &self,
        organization_id: StringUuid,
        name: &str,
    ) -> Result<Option<Role>> {
        self.check_available()?;
        let roles = self.roles.read().await;
        Ok(roles
            .iter()
            .find(|r| {
                r.organization_id == organization_id && r.name == name && r.is_system && r.is_active
            })
            .cloned())
    }

    async fn list_roles(&self, organization_id: StringUuid) -> Result<Vec<Role>> {
        self.check_available()?;
        let mut roles: Vec<Role> = self
            .roles
            .read()
            .await
            .iter()
            .filter(|r| r.organization_id == organization_id && r.is_active)
            .cloned()
            .collect();
        roles.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(roles)
    }

    async fn update_role(
        &self,
        id: StringUuid,
        input: &UpdateRolePermissionsInput,
        grants: &[RoleGrant],
    ) -> Result<Role> {
        self.check_available()?;
        let mut roles = self.roles.write().await;
        let mut stored_grants = self.grants.write().await;

        let mut role = roles
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Role {} not found", id)))?;
        if let Some(name) = &input.name {
            role.name = name.clone();
        }
        if input.description.is_some() {
            role.description = input.description.clone();
        }
        role.updated_at = Utc::now();

        // Nothing is written until both halves are known to succeed.
        if self.grant_writes_unavailable.load(Ordering::SeqCst) {
            return Err(AppError::Database(sqlx::Error::PoolTimedOut));
        }

        stored_grants.retain(|(role_id, _)| *role_id != id);
        stored_grants.extend(grants.iter().map(|g| (id, *g)));
        if let Some(slot) = roles.iter_mut().find(|r| r.id == id) {
            *slot = role.clone();
        }
        Ok(role)
    }

    async fn deactivate_role(&self, id: StringUuid) -> Result<()> {
        self.check_available()?;
        let mut roles = self.roles.write().await;
        let role = roles
            .iter_mut()
            .find(|r| r.id == id && r.is_active)
            .ok_or_else(|| AppError::NotFound(format!("Role {} not found", id)))?;
        role.is_active = false;
        Ok(())
    }

    async fn assign_role_to_user(
        &self,
        input: &AssignRoleInput,
        assigned_by: Option<StringUuid>,
    ) -> Result<UserRole> {
        self.check_available()?;
        let user_role = UserRole {
            id: StringUuid::new_v4(),
            user_id: input.user_id.into(),
            role_id: input.role_id.into(),
            assigned_by,
            assigned_at: Utc::now(),
            expires_at: input.expires_at,
            is_active: true,
        };
        self.user_roles.write().await.push(user_role.clone());
        Ok(user_role)
    }

    async fn list_user_roles(&self, user_id: StringUuid) -> Result<Vec<RoleAssignment>> {
        self.check_available()?;
        let roles = self.roles.read().await;
        let user_roles = self.user_roles.read().await;
        let mut assignments: Vec<RoleAssignment> = user_roles
            .iter()
            .filter(|ur| ur.user_id == user_id && ur.is_active)
            .filter_map(|ur| {
                roles.iter().find(|r| r.id == ur.role_id).map(|role| RoleAssignment {
                    assignment: ur.clone(),
                    role: role.clone(),
                })
            })
            .collect();
        assignments.sort_by(|a, b| a.role.name.cmp(&b.role.name));
        Ok(assignments)
    }

    async fn deactivate_user_role(&self, user_id: StringUuid, role_id: StringUuid) -> Result<()> {
        self.check_available()?;
        let mut user_roles = self.user_roles.write().await;
        for ur in user_roles
            .iter_mut()
            .filter(|ur| ur.user_id == user_id && ur.role_id == role_id)
        {
            ur.is_active = false;
        }
        Ok(())
    }

    async fn replace_user_roles(
        &self,
        input: &AssignRoleInput,
        assigned_by: Option<StringUuid>,
    ) -> Result<UserRole> {
        self.check_available()?;
        let user_id: StringUuid = input.user_id.into();
        let mut user_roles = self.user_roles.write().await;
        for ur in user_roles.iter_mut().filter(|ur| ur.user_id == user_id) {
            ur.is_active = false;
        }
        let user_role = UserRole {
            id: StringUuid::new_v4(),
            user_id,
            role_id: input.role_id.into(),
            assigned_by,
            assigned_at: Utc::now(),
            expires_at: input.expires_at,
            is_active: true,
        };
        user_roles.push(user_role.clone());
        Ok(user_role)
    }

    async fn list_user_overrides(&self, user_id: StringUuid) -> Result<Vec<UserPermission>> {
        self.check_available()?;
        let mut overrides: Vec<UserPermission> = self
            .overrides
            .read()
            .await
            .iter()
            .filter(|o| o.user_id == user_id)
            .map(|o| UserPermission {
                resource_pattern: stored_pattern(o.permission, o.resource_pattern),
                ..o.clone()
            })
            .collect();
        overrides.sort_by_key(|o| o.permission.to_string());
        Ok(overrides)
    }

    async fn upsert_override(
        &self,
        input: &PermissionOverrideInput,
        granted: bool,
        assigned_by: Option<StringUuid>,
    ) -> Result<UserPermission> {
        self.check_available()?;
        let user_id: StringUuid = input.user_id.into();
        let stored = UserPermission {
            id: StringUuid::new_v4(),
            user_id,
            permission: input.permission,
            resource_pattern: input.resource_pattern,
            granted,
            assigned_by,
            assigned_at: Utc::now(),
            expires_at: input.expires_at,
            reason: input.reason.clone(),
        };
        let mut overrides = self.overrides.write().await;
        overrides.retain(|o| !(o.user_id == user_id && o.permission == input.permission));
        overrides.push(stored.clone());
        Ok(stored)
    }

    async fn delete_override(&self, user_id: StringUuid, permission: PermissionName) -> Result<()> {
        self.check_available()?;
        self.overrides
            .write()
            .await
            .retain(|o| !(o.user_id == user_id && o.permission == permission));
        Ok(())
    }
}

// ============================================================================
// Fixtures
// ============================================================================

pub fn grant(permission: &str, pattern: ResourcePattern) -> RoleGrant {
    RoleGrant {
        permission: permission.parse().unwrap(),
        resource_pattern: pattern,
        granted: true,
    }
}

pub fn session(user_id: StringUuid, role: ProfileRole) -> Session {
    Session {
        user_id,
        organization_id: StringUuid::new_v4(),
        role,
        team_ids: vec![],
    }
}

pub fn resolver(repo: &Arc<TestRbacRepository>) -> PermissionResolver<TestRbacRepository> {
    PermissionResolver::new(repo.clone())
}

pub fn rbac_service(repo: &Arc<TestRbacRepository>) -> RbacService<TestRbacRepository> {
    RbacService::new(repo.clone())
}
