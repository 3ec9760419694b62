//! Role, grant and override store

use crate::domain::{
    AssignRoleInput, CreateRoleInput, PermissionName, PermissionOverrideInput, ResourcePattern,
    Role, RoleAssignment, RoleGrant, StringUuid, UpdateRolePermissionsInput, UserPermission,
    UserRole,
};
use crate::error::{AppError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, MySql, MySqlPool, Transaction};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RbacRepository: Send + Sync {
    // Resolver inputs. Implementations should filter expiry; the resolver
    // re-checks it anyway.
    async fn list_active_roles_for_user(&self, user_id: StringUuid) -> Result<Vec<RoleAssignment>>;
    async fn list_granted_permissions_for_role(&self, role_id: StringUuid)
        -> Result<Vec<RoleGrant>>;
    async fn list_active_overrides_for_user(
        &self,
        user_id: StringUuid,
    ) -> Result<Vec<UserPermission>>;

    // Roles
    async fn create_role(
        &self,
        input: &CreateRoleInput,
        grants: &[RoleGrant],
        created_by: Option<StringUuid>,
    ) -> Result<Role>;
    async fn find_role_by_id(&self, id: StringUuid) -> Result<Option<Role>>;
    async fn find_system_role(
        &self,
        organization_id: StringUuid,
        name: &str,
    ) -> Result<Option<Role>>;
    /// Active roles of the organization, ordered by name.
    async fn list_roles(&self, organization_id: StringUuid) -> Result<Vec<Role>>;
    /// Rename and replace the role's grants as a single unit.
    async fn update_role(
        &self,
        id: StringUuid,
        input: &UpdateRolePermissionsInput,
        grants: &[RoleGrant],
    ) -> Result<Role>;
    async fn deactivate_role(&self, id: StringUuid) -> Result<()>;

    // User roles
    async fn assign_role_to_user(
        &self,
        input: &AssignRoleInput,
        assigned_by: Option<StringUuid>,
    ) -> Result<UserRole>;
    /// Active assignments with their roles, expired ones included.
    async fn list_user_roles(&self, user_id: StringUuid) -> Result<Vec<RoleAssignment>>;
    async fn deactivate_user_role(&self, user_id: StringUuid, role_id: StringUuid) -> Result<()>;
    /// Deactivate every active assignment of the user and insert the new one
    /// as a single unit.
    async fn replace_user_roles(
        &self,
        input: &AssignRoleInput,
        assigned_by: Option<StringUuid>,
    ) -> Result<UserRole>;

    // Overrides
    /// Every override of the user, expired ones included.
    async fn list_user_overrides(&self, user_id: StringUuid) -> Result<Vec<UserPermission>>;
    async fn upsert_override(
        &self,
        input: &PermissionOverrideInput,
        granted: bool,
        assigned_by: Option<StringUuid>,
    ) -> Result<UserPermission>;
    async fn delete_override(&self, user_id: StringUuid, permission: PermissionName) -> Result<()>;
}

const ROLE_COLUMNS: &str = "id, organization_id, name, description, is_system, is_active, \
                            created_by, created_at, updated_at";

const ASSIGNMENT_SELECT: &str = r#"
    SELECT ur.id AS assignment_id, ur.user_id, ur.role_id, ur.assigned_by, ur.assigned_at,
           ur.expires_at, ur.is_active AS assignment_active,
           r.organization_id, r.name, r.description, r.is_system,
           r.is_active AS role_active, r.created_by, r.created_at, r.updated_at
    FROM user_roles ur
    INNER JOIN roles r ON r.id = ur.role_id
"#;

const OVERRIDE_SELECT: &str = r#"
    SELECT up.id, up.user_id, p.name AS permission_name,
           COALESCE(up.resource_pattern, p.resource_pattern) AS resource_pattern,
           up.granted, up.assigned_by, up.assigned_at, up.expires_at, up.reason
    FROM user_permissions up
    INNER JOIN permissions p ON p.id = up.permission_id
"#;

#[derive(Debug, FromRow)]
struct AssignmentRow {
    assignment_id: StringUuid,
    user_id: StringUuid,
    role_id: StringUuid,
    assigned_by: Option<StringUuid>,
    assigned_at: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
    assignment_active: bool,
    organization_id: StringUuid,
    name: String,
    description: Option<String>,
    is_system: bool,
    role_active: bool,
    created_by: Option<StringUuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<AssignmentRow> for RoleAssignment {
    fn from(row: AssignmentRow) -> Self {
        RoleAssignment {
            assignment: UserRole {
                id: row.assignment_id,
                user_id: row.user_id,
                role_id: row.role_id,
                assigned_by: row.assigned_by,
                assigned_at: row.assigned_at,
                expires_at: row.expires_at,
                is_active: row.assignment_active,
            },
            role: Role {
                id: row.role_id,
                organization_id: row.organization_id,
                name: row.name,
                description: row.description,
                is_system: row.is_system,
                is_active: row.role_active,
                created_by: row.created_by,
                created_at: row.created_at,
                updated_at: row.updated_at,
            },
        }
    }
}

#[derive(Debug, FromRow)]
struct GrantRow {
    permission_name: String,
    resource_pattern: Option<String>,
    granted: bool,
}

impl TryFrom<GrantRow> for RoleGrant {
    type Error = AppError;

    fn try_from(row: GrantRow) -> Result<Self> {
        Ok(RoleGrant {
            permission: row.permission_name.parse()?,
            resource_pattern: ResourcePattern::from_column(row.resource_pattern.as_deref())?,
            granted: row.granted,
        })
    }
}

#[derive(Debug, FromRow)]
struct OverrideRow {
    id: StringUuid,
    user_id: StringUuid,
    permission_name: String,
    resource_pattern: Option<String>,
    granted: bool,
    assigned_by: Option<StringUuid>,
    assigned_at: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
    reason: Option<String>,
}

impl TryFrom<OverrideRow> for UserPermission {
    type Error = AppError;

    /// A revocation ignores scope, so an unreadable pattern on one decodes
    /// as `none` instead of dropping the row.
    fn try_from(row: OverrideRow) -> Result<Self> {
        let resource_pattern = match ResourcePattern::from_column(row.resource_pattern.as_deref()) {
            Ok(pattern) => pattern,
            Err(e) if !row.granted => {
                tracing::warn!(
                    error = %e,
                    permission = %row.permission_name,
                    "Revoking override has an unreadable pattern, keeping it"
                );
                ResourcePattern::None
            }
            Err(e) => return Err(e),
        };

        Ok(UserPermission {
            id: row.id,
            user_id: row.user_id,
            permission: row.permission_name.parse()?,
            resource_pattern,
            granted: row.granted,
            assigned_by: row.assigned_by,
            assigned_at: row.assigned_at,
            expires_at: row.expires_at,
            reason: row.reason,
        })
    }
}

/// Convert rows, dropping any that no longer decode. A stale row must not
/// fail the whole resolution; dropping one can only remove access.
fn decode_rows<R, T>(rows: Vec<R>, what: &str) -> Vec<T>
where
    T: TryFrom<R, Error = AppError>,
{
    rows.into_iter()
        .filter_map(|row| match T::try_from(row) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(error = %e, "Skipping undecodable {} row", what);
                None
            }
        })
        .collect()
}

/// `none` on a grant or override is stored as NULL so the catalog pattern applies.
fn pattern_column(pattern: ResourcePattern) -> Option<&'static str> {
    match pattern {
        ResourcePattern::None => None,
        other => Some(other.as_str()),
    }
}

pub struct RbacRepositoryImpl {
    pool: MySqlPool,
}

impl RbacRepositoryImpl {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    async fn insert_grants(
        tx: &mut Transaction<'_, MySql>,
        role_id: StringUuid,
        grants: &[RoleGrant],
    ) -> Result<()> {
        for grant in grants {
            let result = sqlx::query(
                r#"
                INSERT INTO role_permissions (id, role_id, permission_id, resource_pattern, granted, created_at)
                SELECT ?, ?, p.id, ?, ?, NOW()
                FROM permissions p
                WHERE p.name = ?
                "#,
            )
            .bind(StringUuid::new_v4())
            .bind(role_id)
            .bind(pattern_column(grant.resource_pattern))
            .bind(grant.granted)
            .bind(grant.permission.to_string())
            .execute(&mut **tx)
            .await?;

            if result.rows_affected() == 0 {
                return Err(AppError::NotFound(format!(
                    "Permission {} is not seeded",
                    grant.permission
                )));
            }
        }
        Ok(())
    }

    async fn insert_user_role(
        tx: &mut Transaction<'_, MySql>,
        input: &AssignRoleInput,
        assigned_by: Option<StringUuid>,
    ) -> Result<StringUuid> {
        let id = StringUuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO user_roles (id, user_id, role_id, assigned_by, assigned_at, expires_at, is_active)
            VALUES (?, ?, ?, ?, NOW(), ?, TRUE)
            "#,
        )
        .bind(id)
        .bind(StringUuid::from(input.user_id))
        .bind(StringUuid::from(input.role_id))
        .bind(assigned_by)
        .bind(input.expires_at)
        .execute(&mut **tx)
        .await?;
        Ok(id)
    }

    async fn find_user_role(&self, id: StringUuid) -> Result<UserRole> {
        sqlx::query_as::<_, UserRole>(
            "SELECT id, user_id, role_id, assigned_by, assigned_at, expires_at, is_active \
             FROM user_roles WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("Failed to assign role")))
    }
}

#[async_trait]
impl RbacRepository for RbacRepositoryImpl {
    async fn list_active_roles_for_user(&self, user_id: StringUuid) -> Result<Vec<RoleAssignment>> {
        let sql = format!(
            "{} WHERE ur.user_id = ? AND ur.is_active = TRUE AND r.is_active = TRUE \
             AND (ur.expires_at IS NULL OR ur.expires_at > NOW()) ORDER BY r.name",
            ASSIGNMENT_SELECT
        );
        let rows = sqlx::query_as::<_, AssignmentRow>(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(RoleAssignment::from).collect())
    }

    async fn list_granted_permissions_for_role(
        &self,
        role_id: StringUuid,
    ) -> Result<Vec<RoleGrant>> {
        let rows = sqlx::query_as::<_, GrantRow>(
            r#"
            SELECT p.name AS permission_name,
                   COALESCE(rp.resource_pattern, p.resource_pattern) AS resource_pattern,
                   rp.granted
            FROM role_permissions rp
            INNER JOIN permissions p ON p.id = rp.permission_id
            WHERE rp.role_id = ? AND rp.granted = TRUE
            "#,
        )
        .bind(role_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(decode_rows(rows, "role permission"))
    }

    async fn list_active_overrides_for_user(
        &self,
        user_id: StringUuid,
    ) -> Result<Vec<UserPermission>> {
        let sql = format!(
            "{} WHERE up.user_id = ? AND (up.expires_at IS NULL OR up.expires_at > NOW())",
            OVERRIDE_SELECT
        );
        let rows = sqlx::query_as::<_, OverrideRow>(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(decode_rows(rows, "user permission"))
    }

    async fn create_role(
        &self,
        input: &CreateRoleInput,
        grants: &[RoleGrant],
        created_by: Option<StringUuid>,
    ) -> Result<Role> {
        let id = StringUuid::new_v4();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO roles (id, organization_id, name, description, is_system, is_active, created_by, created_at, updated_at)
            VALUES (?, ?, ?, ?, FALSE, TRUE, ?, NOW(), NOW())
            "#,
        )
        .bind(id)
        .bind(StringUuid::from(input.organization_id))
        .bind(&input.name)
        .bind(&input.description)
        .bind(created_by)
        .execute(&mut *tx)
        .await?;

        Self::insert_grants(&mut tx, id, grants).await?;
        tx.commit().await?;

        self.find_role_by_id(id)
            .await?
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("Failed to create role")))
    }

    async fn list_roles(&self, organization_id: StringUuid) -> Result<Vec<Role>> {
        let sql = format!(
            "SELECT {} FROM roles WHERE organization_id = ? AND is_active = TRUE ORDER BY name",
            ROLE_COLUMNS
        );
        let roles = sqlx::query_as::<_, Role>(&sql)
            .bind(organization_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(roles)
    }

    async fn find_role_by_id(&self, id: StringUuid) -> Result<Option<Role>> {
        let sql = format!("SELECT {} FROM roles WHERE id = ?", ROLE_COLUMNS);
        let role = sqlx::query_as::<_, Role>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(role)
    }

    async fn find_system_role(
        &self,
        organization_id: StringUuid,
        name: &str,
    ) -> Result<Option<Role>> {
        let sql = format!(
            "SELECT {} FROM roles WHERE organization_id = ? AND name = ? \
             AND is_system = TRUE AND is_active = TRUE",
            ROLE_COLUMNS
        );
        let role = sqlx::query_as::<_, Role>(&sql)
            .bind(organization_id)
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;

        Ok(role)
    }

    async fn update_role(
        &self,
        id: StringUuid,
        input: &UpdateRolePermissionsInput,
        grants: &[RoleGrant],
    ) -> Result<Role> {
        let existing = self
            .find_role_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Role {} not found", id)))?;

        let name = input.name.as_ref().unwrap_or(&existing.name);
        let description = input.description.as_ref().or(existing.description.as_ref());

        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE roles SET name = ?, description = ?, updated_at = NOW() WHERE id = ?")
            .bind(name)
            .bind(description)
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM role_permissions WHERE role_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        Self::insert_grants(&mut tx, id, grants).await?;

        tx.commit().await?;

        self.find_role_by_id(id)
            .await?
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("Failed to update role")))
    }

    async fn deactivate_role(&self, id: StringUuid) -> Result<()> {
        let result = sqlx::query(
            "UPDATE roles SET is_active = FALSE, updated_at = NOW() WHERE id = ? AND is_active = TRUE",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Role {} not found", id)));
        }

        Ok(())
    }

    async fn assign_role_to_user(
        &self,
        input: &AssignRoleInput,
        assigned_by: Option<StringUuid>,
    ) -> Result<UserRole> {
        let mut tx = self.pool.begin().await?;
        let id = Self::insert_user_role(&mut tx, input, assigned_by).await?;
        tx.commit().await?;

        self.find_user_role(id).await
    }

    async fn list_user_roles(&self, user_id: StringUuid) -> Result<Vec<RoleAssignment>> {
        let sql = format!(
            "{} WHERE ur.user_id = ? AND ur.is_active = TRUE ORDER BY r.name",
            ASSIGNMENT_SELECT
        );
        let rows = sqlx::query_as::<_, AssignmentRow>(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(RoleAssignment::from).collect())
    }

    async fn deactivate_user_role(&self, user_id: StringUuid, role_id: StringUuid) -> Result<()> {
        let result = sqlx::query(
            "UPDATE user_roles SET is_active = FALSE WHERE user_id = ? AND role_id = ? AND is_active = TRUE",
        )
        .bind(user_id)
        .bind(role_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!(
                "User {} has no active assignment of role {}",
                user_id, role_id
            )));
        }

        Ok(())
    }

    async fn replace_user_roles(
        &self,
        input: &AssignRoleInput,
        assigned_by: Option<StringUuid>,
    ) -> Result<UserRole> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE user_roles SET is_active = FALSE WHERE user_id = ? AND is_active = TRUE")
            .bind(StringUuid::from(input.user_id))
            .execute(&mut *tx)
            .await?;
        let id = Self::insert_user_role(&mut tx, input, assigned_by).await?;

        tx.commit().await?;
        self.find_user_role(id).await
    }

    async fn list_user_overrides(&self, user_id: StringUuid) -> Result<Vec<UserPermission>> {
        let sql = format!("{} WHERE up.user_id = ? ORDER BY p.name", OVERRIDE_SELECT);
        let rows = sqlx::query_as::<_, OverrideRow>(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(decode_rows(rows, "user permission"))
    }

    async fn upsert_override(
        &self,
        input: &PermissionOverrideInput,
        granted: bool,
        assigned_by: Option<StringUuid>,
    ) -> Result<UserPermission> {
        let user_id = StringUuid::from(input.user_id);
        let result = sqlx::query(
            r#"
            INSERT INTO user_permissions (id, user_id, permission_id, resource_pattern, granted, assigned_by, assigned_at, expires_at, reason)
            SELECT ?, ?, p.id, ?, ?, ?, NOW(), ?, ?
            FROM permissions p
            WHERE p.name = ?
            ON DUPLICATE KEY UPDATE
                resource_pattern = VALUES(resource_pattern),
                granted = VALUES(granted),
                assigned_by = VALUES(assigned_by),
                assigned_at = NOW(),
                expires_at = VALUES(expires_at),
                reason = VALUES(reason)
            "#,
        )
        .bind(StringUuid::new_v4())
        .bind(user_id)
        .bind(pattern_column(input.resource_pattern))
        .bind(granted)
        .bind(assigned_by)
        .bind(input.expires_at)
        .bind(&input.reason)
        .bind(input.permission.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!(
                "Permission {} is not seeded",
                input.permission
            )));
        }

        let sql = format!("{} WHERE up.user_id = ? AND p.name = ?", OVERRIDE_SELECT);
        let row = sqlx::query_as::<_, OverrideRow>(&sql)
            .bind(user_id)
            .bind(input.permission.to_string())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("Failed to store override")))?;

        UserPermission::try_from(row)
    }

    async fn delete_override(&self, user_id: StringUuid, permission: PermissionName) -> Result<()> {
        let result = sqlx::query(
            r#"
            DELETE up FROM user_permissions up
            INNER JOIN permissions p ON p.id = up.permission_id
            WHERE up.user_id = ? AND p.name = ?
            "#,
        )
        .bind(user_id)
        .bind(permission.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!(
                "No override of {} for user {}",
                permission, user_id
            )));
        }

        Ok(())
    }
}
