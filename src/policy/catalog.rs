//! Static permission catalog
//!
//! Every `Module × Action` pair exists exactly once, with the `all` resource
//! pattern. Narrower scopes are expressed on the role grant, not by extra
//! catalog rows.

use crate::domain::{
    Action, Module, Permission, PermissionLevel, PermissionName, ProfileRole, ResourcePattern,
};
use std::collections::BTreeMap;

/// Bumped whenever entries are added or renamed. Seeding records it.
pub const CATALOG_VERSION: u32 = 1;

lazy_static::lazy_static! {
    static ref CATALOG: PermissionCatalog = PermissionCatalog::build();
}

/// Read-only view of all known permissions
#[derive(Debug)]
pub struct PermissionCatalog {
    entries: Vec<Permission>,
}

/// The process-wide catalog.
pub fn catalog() -> &'static PermissionCatalog {
    &CATALOG
}

impl PermissionCatalog {
    fn build() -> Self {
        let entries = Module::ALL
            .into_iter()
            .flat_map(|module| {
                Action::ALL.into_iter().map(move |action| Permission {
                    name: PermissionName::new(module, action),
                    display_name: format!("{} {}", action.display_name(), module.display_name()),
                    description: None,
                    resource_pattern: ResourcePattern::All,
                    is_system: true,
                })
            })
            .collect();
        Self { entries }
    }

    pub fn all(&self) -> &[Permission] {
        &self.entries
    }

    pub fn get(&self, name: PermissionName) -> Option<&Permission> {
        self.entries.iter().find(|p| p.name == name)
    }

    pub fn list_by_module(&self, module: Module) -> Vec<&Permission> {
        self.entries.iter().filter(|p| p.module() == module).collect()
    }

    pub fn grouped_by_module(&self) -> BTreeMap<Module, Vec<&Permission>> {
        let mut grouped: BTreeMap<Module, Vec<&Permission>> = BTreeMap::new();
        for permission in &self.entries {
            grouped.entry(permission.module()).or_default().push(permission);
        }
        grouped
    }

    /// `true` iff `name` is a well-formed `module.action` from the closed enums.
    pub fn is_valid_name(&self, name: &str) -> bool {
        PermissionName::parse_lenient(name).is_some_and(|n| self.get(n).is_some())
    }

    /// Permissions a role editor grants for `level` on `module`.
    ///
    /// Levels are cumulative: `edit` carries `view`, `full_edit` carries both.
    pub fn expand_level(&self, module: Module, level: PermissionLevel) -> Vec<PermissionName> {
        PermissionLevel::ALL
            .into_iter()
            .filter(|l| *l <= level)
            .map(|l| PermissionName::new(module, l.action()))
            .filter(|name| {
                self.get(*name)
                    .is_some_and(|p| p.resource_pattern == ResourcePattern::All)
            })
            .collect()
    }

    /// Highest level present among `granted` for `module`, if any.
    pub fn level_of<I>(&self, module: Module, granted: I) -> Option<PermissionLevel>
    where
        I: IntoIterator<Item = PermissionName>,
    {
        granted
            .into_iter()
            .filter(|name| name.module == module)
            .filter_map(|name| {
                PermissionLevel::ALL
                    .into_iter()
                    .find(|level| level.action() == name.action)
            })
            .max()
    }
}

/// Levels the seeded system role for `role` starts with.
///
/// Organisations edit these afterwards; seeding never overwrites an
/// existing role's grants.
pub fn system_role_levels(role: ProfileRole) -> BTreeMap<Module, PermissionLevel> {
    use Module::*;
    use PermissionLevel::*;

    let levels: &[(Module, PermissionLevel)] = match role {
        ProfileRole::Admin => return Module::ALL.into_iter().map(|m| (m, FullEdit)).collect(),
        ProfileRole::Manager => &[
            (Tickets, FullEdit),
            (Services, FullEdit),
            (KnowledgeBase, FullEdit),
            (Assets, FullEdit),
            (Workflows, FullEdit),
            (SlaPolicies, FullEdit),
            (Teams, FullEdit),
            (Users, View),
            (Analytics, View),
            (Reports, View),
        ],
        ProfileRole::Agent => &[
            (Tickets, Edit),
            (Services, View),
            (KnowledgeBase, Edit),
            (Assets, View),
            (Teams, View),
        ],
        ProfileRole::User => &[(Tickets, View), (Services, View), (KnowledgeBase, View)],
    };
    levels.iter().copied().collect()
}
