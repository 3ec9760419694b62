//! Page access gate
//!
//! Maps a navigation path to the rule that governs it and yields an
//! allow/deny decision. Paths without a rule are allowed: sensitive pages
//! must be declared explicitly.

use super::capability::Capabilities;
use crate::domain::{Action, Module, PageAccessRule, PermissionName, ProfileRole, Session};
use crate::error::{AppError, Result};
use crate::telemetry::metrics::PAGE_DECISIONS_TOTAL;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// How a path is matched against the ordered rule list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStrategy {
    /// First rule in declaration order whose path prefixes the request
    #[default]
    FirstMatch,
    /// The matching rule with the longest path; ties go to the earlier rule
    LongestPrefix,
}

impl MatchStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchStrategy::FirstMatch => "first_match",
            MatchStrategy::LongestPrefix => "longest_prefix",
        }
    }
}

impl fmt::Display for MatchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MatchStrategy {
    type Err = AppError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "first_match" => Ok(MatchStrategy::FirstMatch),
            "longest_prefix" => Ok(MatchStrategy::LongestPrefix),
            other => Err(AppError::Validation(format!(
                "Unknown page match strategy '{}'",
                other
            ))),
        }
    }
}

/// Outcome of a page decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessDecision {
    Allow,
    DenyUnauthenticated,
    DenyForbidden,
}

impl AccessDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, AccessDecision::Allow)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AccessDecision::Allow => "allow",
            AccessDecision::DenyUnauthenticated => "deny_unauthenticated",
            AccessDecision::DenyForbidden => "deny_forbidden",
        }
    }
}

/// A rule that can never be selected under first-match
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShadowedRule {
    pub index: usize,
    pub path: String,
    pub shadowed_by: usize,
    pub shadowed_by_path: String,
}

/// Ordered rule list plus the strategy used to pick a rule
#[derive(Debug, Clone)]
pub struct PageAccessGate {
    rules: Vec<PageAccessRule>,
    strategy: MatchStrategy,
}

impl Default for PageAccessGate {
    fn default() -> Self {
        Self::with_default_rules(MatchStrategy::default())
    }
}

impl PageAccessGate {
    pub fn new(rules: Vec<PageAccessRule>, strategy: MatchStrategy) -> Self {
        let gate = Self { rules, strategy };
        if gate.strategy == MatchStrategy::FirstMatch {
            for shadowed in gate.shadowed_rules() {
                tracing::warn!(
                    path = %shadowed.path,
                    shadowed_by = %shadowed.shadowed_by_path,
                    "Page rule can never match under first-match ordering"
                );
            }
        }
        gate
    }

    pub fn with_default_rules(strategy: MatchStrategy) -> Self {
        Self::new(default_rules(), strategy)
    }

    /// Parse a JSON array of rules.
    pub fn from_json_str(json: &str, strategy: MatchStrategy) -> Result<Self> {
        let rules: Vec<PageAccessRule> = serde_json::from_str(json)
            .map_err(|e| AppError::Validation(format!("Invalid page access rules: {}", e)))?;
        if let Some(rule) = rules.iter().find(|r| !r.path.starts_with('/')) {
            return Err(AppError::Validation(format!(
                "Page rule path '{}' must start with '/'",
                rule.path
            )));
        }
        Ok(Self::new(rules, strategy))
    }

    pub fn from_file(path: &Path, strategy: MatchStrategy) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read page access rules from {}", path.display()))?;
        let gate = Self::from_json_str(&json, strategy)?;
        tracing::info!(
            path = %path.display(),
            rules = gate.rules.len(),
            strategy = %strategy,
            "Loaded page access rules"
        );
        Ok(gate)
    }

    pub fn rules(&self) -> &[PageAccessRule] {
        &self.rules
    }

    pub fn strategy(&self) -> MatchStrategy {
        self.strategy
    }

    /// Rule that governs `path`, if any.
    pub fn matching_rule(&self, path: &str) -> Option<&PageAccessRule> {
        let mut candidates = self.rules.iter().filter(|r| r.covers(path));
        match self.strategy {
            MatchStrategy::FirstMatch => candidates.next(),
            // max_by_key keeps the last maximum, so fold to keep the first.
            MatchStrategy::LongestPrefix => candidates.fold(None, |best, rule| match best {
                Some(b) if b.path.len() >= rule.path.len() => Some(b),
                _ => Some(rule),
            }),
        }
    }

    /// Role and permission check for an authenticated user.
    pub fn has_access<C>(&self, path: &str, role: ProfileRole, permissions: &C) -> bool
    where
        C: Capabilities + ?Sized,
    {
        admits(self.matching_rule(path), role, permissions)
    }

    /// Full decision, including the unauthenticated case.
    pub fn decide<C>(&self, path: &str, session: Option<&Session>, permissions: &C) -> AccessDecision
    where
        C: Capabilities + ?Sized,
    {
        let rule = self.matching_rule(path);
        let decision = match session {
            None => AccessDecision::DenyUnauthenticated,
            Some(session) if admits(rule, session.role, permissions) => AccessDecision::Allow,
            Some(_) => AccessDecision::DenyForbidden,
        };

        tracing::debug!(
            path,
            role = session.map(|s| s.role.as_str()),
            rule = rule.map(|r| r.path.as_str()),
            decision = decision.as_str(),
            "Page access decision"
        );
        metrics::counter!(PAGE_DECISIONS_TOTAL, "decision" => decision.as_str()).increment(1);

        decision
    }

    /// Rules whose role list admits `role`, permission requirements ignored.
    pub fn accessible_pages(&self, role: ProfileRole) -> Vec<&PageAccessRule> {
        self.rules
            .iter()
            .filter(|r| r.is_open() || r.allowed_roles.contains(&role))
            .collect()
    }

    /// Rules `role` can actually open with `permissions`.
    pub fn accessible_pages_for<C>(&self, role: ProfileRole, permissions: &C) -> Vec<&PageAccessRule>
    where
        C: Capabilities + ?Sized,
    {
        self.rules
            .iter()
            .filter(|r| self.has_access(&r.path, role, permissions))
            .collect()
    }

    /// Rules that an earlier rule's path always claims first.
    pub fn shadowed_rules(&self) -> Vec<ShadowedRule> {
        self.rules
            .iter()
            .enumerate()
            .filter_map(|(index, rule)| {
                self.rules[..index]
                    .iter()
                    .position(|earlier| rule.path.starts_with(&earlier.path))
                    .map(|by| ShadowedRule {
                        index,
                        path: rule.path.clone(),
                        shadowed_by: by,
                        shadowed_by_path: self.rules[by].path.clone(),
                    })
            })
            .collect()
    }
}

/// The application's page table.
pub fn default_rules() -> Vec<PageAccessRule> {
    const ADMIN: &[ProfileRole] = &[ProfileRole::Admin];
    let admin_view = Some(PermissionName::new(Module::Administration, Action::View));
    let admin_full = Some(PermissionName::new(Module::Administration, Action::FullEdit));

    vec![
        PageAccessRule::open("/dashboard", "Dashboard"),
        PageAccessRule::open("/accounts", "Accounts"),
        PageAccessRule::open("/tickets", "Tickets"),
        PageAccessRule::open("/workflows", "Workflows"),
        PageAccessRule::open("/assets", "Assets"),
        PageAccessRule::open("/services", "Services"),
        PageAccessRule::open("/knowledge-base", "Knowledge Base"),
        PageAccessRule::open("/analytics", "Analytics"),
        PageAccessRule::open("/notifications", "Notifications"),
        PageAccessRule::open("/users", "Users & Teams"),
        PageAccessRule::open("/settings", "Settings"),
        PageAccessRule::open("/profile", "Profile"),
        PageAccessRule::restricted("/admin/security", "Security & Access", ADMIN, admin_full),
        PageAccessRule::restricted("/admin/approvals", "Approval Workflows", ADMIN, admin_view),
        PageAccessRule::restricted("/admin/catalog", "Service Catalog", ADMIN, admin_view),
        PageAccessRule::restricted("/admin/priorities", "Priority Matrix", ADMIN, admin_view),
        PageAccessRule::restricted(
            "/admin/service-requests",
            "Service Requests",
            ADMIN,
            admin_view,
        ),
        PageAccessRule::restricted("/admin/sla", "SLA Policies", ADMIN, admin_view),
        PageAccessRule::restricted("/integrations", "Integrations", ADMIN, admin_full),
    ]
}

/// No governing rule means the page is open.
fn admits<C>(rule: Option<&PageAccessRule>, role: ProfileRole, permissions: &C) -> bool
where
    C: Capabilities + ?Sized,
{
    let Some(rule) = rule else {
        return true;
    };
    if rule.is_open() {
        return true;
    }
    if !rule.allowed_roles.contains(&role) {
        return false;
    }
    rule.requires_permission
        .is_none_or(|required| permissions.grants(required))
}
