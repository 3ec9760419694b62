//! Page access rule model

use super::rbac::PermissionName;
use super::session::ProfileRole;
use serde::{Deserialize, Serialize};

/// One navigation rule. Rules live in an ordered list; order decides which
/// rule applies when prefixes overlap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageAccessRule {
    /// Path prefix the rule covers, e.g. `/admin/security`
    pub path: String,
    pub label: String,
    /// Empty means any authenticated user
    #[serde(default)]
    pub allowed_roles: Vec<ProfileRole>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requires_permission: Option<PermissionName>,
}

impl PageAccessRule {
    pub fn open(path: &str, label: &str) -> Self {
        Self {
            path: path.to_string(),
            label: label.to_string(),
            allowed_roles: vec![],
            requires_permission: None,
        }
    }

    pub fn restricted(
        path: &str,
        label: &str,
        allowed_roles: &[ProfileRole],
        requires_permission: Option<PermissionName>,
    ) -> Self {
        Self {
            path: path.to_string(),
            label: label.to_string(),
            allowed_roles: allowed_roles.to_vec(),
            requires_permission,
        }
    }

    pub fn is_open(&self) -> bool {
        self.allowed_roles.is_empty()
    }

    /// Plain string-prefix test, matching how paths are declared.
    pub fn covers(&self, path: &str) -> bool {
        path.starts_with(&self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Action, Module};

    #[test]
    fn test_rule_json_shape() {
        let json = r#"[
            {"path": "/users", "label": "Users & Teams", "allowedRoles": []},
            {"path": "/admin/security", "label": "Security & Access",
             "allowedRoles": ["admin"], "requiresPermission": "administration.full_edit"}
        ]"#;
        let rules: Vec<PageAccessRule> = serde_json::from_str(json).unwrap();

        assert!(rules[0].is_open());
        assert_eq!(rules[1].allowed_roles, vec![ProfileRole::Admin]);
        assert_eq!(
            rules[1].requires_permission,
            Some(PermissionName::new(Module::Administration, Action::FullEdit))
        );
    }

    #[test]
    fn test_rule_json_rejects_unknown_permission() {
        let json = r#"{"path": "/x", "label": "X", "requiresPermission": "administration.own"}"#;
        assert!(serde_json::from_str::<PageAccessRule>(json).is_err());
    }

    #[test]
    fn test_covers_is_string_prefix() {
        let rule = PageAccessRule::open("/users", "Users");
        assert!(rule.covers("/users"));
        assert!(rule.covers("/users/42"));
        assert!(rule.covers("/users-archive"));
        assert!(!rule.covers("/user"));
    }
}
