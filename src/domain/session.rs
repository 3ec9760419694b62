//! Session identity passed explicitly into every decision

use super::common::StringUuid;
use crate::error::AppError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Profile role used for page rule matching.
///
/// A user may hold many RBAC roles at once; this is the single role stored
/// on the profile, and it is what page rules name in `allowed_roles`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileRole {
    Admin,
    Manager,
    Agent,
    User,
}

impl ProfileRole {
    pub const ALL: [ProfileRole; 4] = [
        ProfileRole::Admin,
        ProfileRole::Manager,
        ProfileRole::Agent,
        ProfileRole::User,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProfileRole::Admin => "admin",
            ProfileRole::Manager => "manager",
            ProfileRole::Agent => "agent",
            ProfileRole::User => "user",
        }
    }

    /// Name of the seeded system role that backs this profile role.
    pub fn system_role_name(&self) -> &'static str {
        match self {
            ProfileRole::Admin => "System Administrator",
            ProfileRole::Manager => "Manager",
            ProfileRole::Agent => "Agent",
            ProfileRole::User => "User",
        }
    }

    /// Landing page a role-specific guard redirects to.
    pub fn home_path(&self) -> &'static str {
        match self {
            ProfileRole::Admin => "/admin/dashboard",
            ProfileRole::Agent => "/tickets",
            ProfileRole::Manager | ProfileRole::User => "/dashboard",
        }
    }
}

impl fmt::Display for ProfileRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProfileRole {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ProfileRole::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| AppError::Validation(format!("Unknown profile role '{}'", s)))
    }
}

/// Authenticated identity for one request or page load
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub user_id: StringUuid,
    pub organization_id: StringUuid,
    pub role: ProfileRole,
    #[serde(default)]
    pub team_ids: Vec<StringUuid>,
}

impl Session {
    pub fn user_context(&self) -> UserContext {
        UserContext {
            user_id: self.user_id,
            team_ids: self.team_ids.clone(),
        }
    }
}

/// What the scope evaluator needs to know about the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserContext {
    pub user_id: StringUuid,
    pub team_ids: Vec<StringUuid>,
}

impl UserContext {
    pub fn is_member_of(&self, team_id: StringUuid) -> bool {
        self.team_ids.contains(&team_id)
    }
}
