//! RBAC (Role-Based Access Control) domain models
//!
//! Permission names are a closed `Module × Action` vocabulary. Strings only
//! appear at the edges (storage rows, JSON, CLI arguments) and are parsed
//! into [`PermissionName`] as early as possible.

use super::common::StringUuid;
use crate::error::AppError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;
use validator::Validate;

/// Functional area a permission applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Module {
    Tickets,
    Services,
    Users,
    Analytics,
    Security,
    KnowledgeBase,
    Assets,
    Reports,
    Integrations,
    Administration,
    Workflows,
    SlaPolicies,
    Teams,
}

impl Module {
    pub const ALL: [Module; 13] = [
        Module::Tickets,
        Module::Services,
        Module::Users,
        Module::Analytics,
        Module::Security,
        Module::KnowledgeBase,
        Module::Assets,
        Module::Reports,
        Module::Integrations,
        Module::Administration,
        Module::Workflows,
        Module::SlaPolicies,
        Module::Teams,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Module::Tickets => "tickets",
            Module::Services => "services",
            Module::Users => "users",
            Module::Analytics => "analytics",
            Module::Security => "security",
            Module::KnowledgeBase => "knowledge_base",
            Module::Assets => "assets",
            Module::Reports => "reports",
            Module::Integrations => "integrations",
            Module::Administration => "administration",
            Module::Workflows => "workflows",
            Module::SlaPolicies => "sla_policies",
            Module::Teams => "teams",
        }
    }

    /// Human-readable label used by role editors.
    pub fn display_name(&self) -> &'static str {
        match self {
            Module::Tickets => "Tickets",
            Module::Services => "Services",
            Module::Users => "Users",
            Module::Analytics => "Analytics",
            Module::Security => "Security",
            Module::KnowledgeBase => "Knowledge Base",
            Module::Assets => "Assets",
            Module::Reports => "Reports",
            Module::Integrations => "Integrations",
            Module::Administration => "Administration",
            Module::Workflows => "Workflows",
            Module::SlaPolicies => "SLA Policies",
            Module::Teams => "Teams",
        }
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Module {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Module::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| AppError::Validation(format!("Unknown module '{}'", s)))
    }
}

/// Operation a permission allows within a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    View,
    Edit,
    FullEdit,
    Create,
    Delete,
    Manage,
}

impl Action {
    pub const ALL: [Action; 6] = [
        Action::View,
        Action::Edit,
        Action::FullEdit,
        Action::Create,
        Action::Delete,
        Action::Manage,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::View => "view",
            Action::Edit => "edit",
            Action::FullEdit => "full_edit",
            Action::Create => "create",
            Action::Delete => "delete",
            Action::Manage => "manage",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Action::View => "View",
            Action::Edit => "Edit",
            Action::FullEdit => "Full Edit",
            Action::Create => "Create",
            Action::Delete => "Delete",
            Action::Manage => "Manage",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Action::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| AppError::Validation(format!("Unknown action '{}'", s)))
    }
}

/// Which resource instances a granted permission covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ResourcePattern {
    All,
    Own,
    Team,
    /// Scope does not apply; the permission is binary.
    #[default]
    None,
}

impl ResourcePattern {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourcePattern::All => "all",
            ResourcePattern::Own => "own",
            ResourcePattern::Team => "team",
            ResourcePattern::None => "none",
        }
    }

    /// Decode a nullable storage column. NULL means the pattern does not apply.
    pub fn from_column(value: Option<&str>) -> Result<Self, AppError> {
        match value {
            None => Ok(ResourcePattern::None),
            Some(s) => s.parse(),
        }
    }
}

impl fmt::Display for ResourcePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourcePattern {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(ResourcePattern::All),
            "own" => Ok(ResourcePattern::Own),
            "team" => Ok(ResourcePattern::Team),
            "none" => Ok(ResourcePattern::None),
            other => Err(AppError::Validation(format!(
                "Unknown resource pattern '{}'",
                other
            ))),
        }
    }
}

lazy_static::lazy_static! {
    /// Shape of a permission name: `<module>.<action>`, lowercase snake case.
    pub static ref PERMISSION_NAME_REGEX: regex::Regex =
        regex::Regex::new(r"^[a-z][a-z_]*\.[a-z][a-z_]*$").unwrap();
}

/// Identity of a permission: `"<module>.<action>"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PermissionName {
    pub module: Module,
    pub action: Action,
}

impl PermissionName {
    pub const fn new(module: Module, action: Action) -> Self {
        Self { module, action }
    }

    /// Parse without reporting why a name was rejected.
    ///
    /// Unknown or malformed names are simply "not found" for capability
    /// queries, so callers on that path get `None` instead of an error.
    pub fn parse_lenient(name: &str) -> Option<Self> {
        name.parse().ok()
    }
}

impl fmt::Display for PermissionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.module, self.action)
    }
}

impl FromStr for PermissionName {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if !PERMISSION_NAME_REGEX.is_match(s) {
            return Err(AppError::Validation(format!(
                "Invalid permission name '{}': expected <module>.<action>",
                s
            )));
        }
        // The regex guarantees exactly one dot.
        let (module, action) = s.split_once('.').unwrap_or((s, ""));
        Ok(Self {
            module: module.parse()?,
            action: action.parse()?,
        })
    }
}

impl TryFrom<String> for PermissionName {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PermissionName> for String {
    fn from(name: PermissionName) -> Self {
        name.to_string()
    }
}

/// Catalog entry. Immutable at runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    pub name: PermissionName,
    pub display_name: String,
    pub description: Option<String>,
    pub resource_pattern: ResourcePattern,
    pub is_system: bool,
}

impl Permission {
    pub fn module(&self) -> Module {
        self.name.module
    }

    pub fn action(&self) -> Action {
        self.name.action
    }
}

/// Role entity, scoped to an organization
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Role {
    pub id: StringUuid,
    pub organization_id: StringUuid,
    pub name: String,
    pub description: Option<String>,
    pub is_system: bool,
    pub is_active: bool,
    pub created_by: Option<StringUuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Default for Role {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            id: StringUuid::new_v4(),
            organization_id: StringUuid::nil(),
            name: String::new(),
            description: None,
            is_system: false,
            is_active: true,
            created_by: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// One RolePermission edge as the store returns it.
///
/// `resource_pattern` is the pattern of this particular edge; two roles may
/// grant the same permission with different scopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleGrant {
    pub permission: PermissionName,
    pub resource_pattern: ResourcePattern,
    pub granted: bool,
}

/// Assignment of a role to a user
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserRole {
    pub id: StringUuid,
    pub user_id: StringUuid,
    pub role_id: StringUuid,
    pub assigned_by: Option<StringUuid>,
    pub assigned_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_active: bool,
}

impl UserRole {
    pub fn is_effective_at(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.expires_at.is_none_or(|at| at > now)
    }
}

/// A user's role assignment joined with the role it points at
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleAssignment {
    pub assignment: UserRole,
    pub role: Role,
}

impl RoleAssignment {
    /// Both the assignment and the role itself must be live.
    pub fn is_effective_at(&self, now: DateTime<Utc>) -> bool {
        self.role.is_active && self.assignment.is_effective_at(now)
    }
}

/// Per-user override that grants or revokes a single permission
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserPermission {
    pub id: StringUuid,
    pub user_id: StringUuid,
    pub permission: PermissionName,
    pub resource_pattern: ResourcePattern,
    pub granted: bool,
    pub assigned_by: Option<StringUuid>,
    pub assigned_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub reason: Option<String>,
}

impl UserPermission {
    pub fn is_effective_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

/// Cumulative access level a role editor assigns per module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionLevel {
    /// Read-only. Can't edit or delete.
    View,
    /// Can edit but can't delete.
    Edit,
    /// Can edit and delete.
    FullEdit,
}

impl PermissionLevel {
    pub const ALL: [PermissionLevel; 3] = [
        PermissionLevel::View,
        PermissionLevel::Edit,
        PermissionLevel::FullEdit,
    ];

    pub fn action(&self) -> Action {
        match self {
            PermissionLevel::View => Action::View,
            PermissionLevel::Edit => Action::Edit,
            PermissionLevel::FullEdit => Action::FullEdit,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            PermissionLevel::View => "View only",
            PermissionLevel::Edit => "Edit",
            PermissionLevel::FullEdit => "Full Edit",
        }
    }
}

/// Input for creating a role
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateRoleInput {
    pub organization_id: Uuid,
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(length(max = 500))]
    pub description: Option<String>,
    #[serde(default)]
    pub levels: BTreeMap<Module, PermissionLevel>,
}

/// Input for replacing a role's module levels
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpdateRolePermissionsInput {
    #[validate(length(min = 1, max = 100))]
    pub name: Option<String>,
    #[validate(length(max = 500))]
    pub description: Option<String>,
    pub levels: BTreeMap<Module, PermissionLevel>,
}

/// Input for assigning a role to a user
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AssignRoleInput {
    pub user_id: Uuid,
    pub role_id: Uuid,
    #[validate(custom(function = "validate_not_in_past"))]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Input for granting or revoking a single permission for one user
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct PermissionOverrideInput {
    pub user_id: Uuid,
    pub permission: PermissionName,
    #[serde(default)]
    pub resource_pattern: ResourcePattern,
    #[validate(length(max = 500))]
    pub reason: Option<String>,
    #[validate(custom(function = "validate_not_in_past"))]
    pub expires_at: Option<DateTime<Utc>>,
}

fn validate_not_in_past(at: &DateTime<Utc>) -> Result<(), validator::ValidationError> {
    if *at > Utc::now() {
        Ok(())
    } else {
        Err(validator::ValidationError::new("expires_in_past"))
    }
}
