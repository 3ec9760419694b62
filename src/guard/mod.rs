//! Rendering adapters over the decision core
//!
//! These functions only pick what a page shell should show. They never
//! decide access themselves; that is [`PageAccessGate`] and
//! [`Capabilities`].

use crate::domain::{PermissionName, ProfileRole, Session};
use crate::policy::{AccessDecision, Capabilities, PageAccessGate};
use serde::{Deserialize, Serialize};

/// Where unauthenticated visitors are sent.
pub const LOGIN_PATH: &str = "/auth/login";

/// Label used when no rule names the page.
const FALLBACK_LABEL: &str = "this page";

/// What a guarded page renders
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "view", rename_all = "snake_case")]
pub enum GuardView {
    Loading,
    AccessDenied { label: String },
    Redirect { to: String },
    Children,
}

/// Map a gate decision to a view. `label` names the denied page.
pub fn guard_view(loading: bool, decision: AccessDecision, label: Option<&str>) -> GuardView {
    if loading {
        return GuardView::Loading;
    }
    match decision {
        AccessDecision::Allow => GuardView::Children,
        AccessDecision::DenyUnauthenticated => GuardView::Redirect {
            to: LOGIN_PATH.to_string(),
        },
        AccessDecision::DenyForbidden => GuardView::AccessDenied {
            label: label.unwrap_or(FALLBACK_LABEL).to_string(),
        },
    }
}

/// Page-level guard: decide with the gate, then pick a view.
pub fn page_guard_view<C>(
    gate: &PageAccessGate,
    path: &str,
    loading: bool,
    session: Option<&Session>,
    permissions: &C,
) -> GuardView
where
    C: Capabilities + ?Sized,
{
    if loading {
        return GuardView::Loading;
    }
    let decision = gate.decide(path, session, permissions);
    let label = gate.matching_rule(path).map(|rule| rule.label.as_str());
    guard_view(false, decision, label)
}

/// Role-specific page: users with another role are sent to their home page.
pub fn role_guard_view(
    loading: bool,
    session: Option<&Session>,
    allowed_roles: &[ProfileRole],
) -> GuardView {
    if loading {
        return GuardView::Loading;
    }
    match session {
        None => GuardView::Redirect {
            to: LOGIN_PATH.to_string(),
        },
        Some(s) if !allowed_roles.is_empty() && !allowed_roles.contains(&s.role) => {
            GuardView::Redirect {
                to: s.role.home_path().to_string(),
            }
        }
        Some(_) => GuardView::Children,
    }
}

/// Element-level guard on a single permission or any of several.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionGuard {
    #[serde(default)]
    pub permission: Option<PermissionName>,
    #[serde(default)]
    pub permissions: Option<Vec<PermissionName>>,
}

impl PermissionGuard {
    pub fn single(permission: PermissionName) -> Self {
        Self {
            permission: Some(permission),
            permissions: None,
        }
    }

    pub fn any_of(permissions: Vec<PermissionName>) -> Self {
        Self {
            permission: None,
            permissions: Some(permissions),
        }
    }

    /// `permission` takes precedence over `permissions`; a guard with
    /// neither denies.
    pub fn allows<C: Capabilities + ?Sized>(&self, held: &C) -> bool {
        match (&self.permission, &self.permissions) {
            (Some(permission), _) => held.grants(*permission),
            (None, Some(any)) => held.has_any(any),
            (None, None) => false,
        }
    }

    pub fn view<C: Capabilities + ?Sized>(&self, loading: bool, held: &C) -> Option<GuardView> {
        if loading {
            return Some(GuardView::Loading);
        }
        // Denied elements render their fallback, not a page-level view.
        self.allows(held).then_some(GuardView::Children)
    }
}
