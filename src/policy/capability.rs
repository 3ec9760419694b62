//! Capability queries over a resolved permission set
//!
//! Pure functions, no I/O. The view/edit/full_edit ladder is monotonic
//! (`full_edit` and `edit` imply `view`); `create` stands alone; `delete`
//! is also implied by `full_edit`.

use super::effective::EffectivePermissions;
use crate::domain::{Action, Module, PermissionName};
use serde::Serialize;
use std::collections::{BTreeSet, HashSet};
use std::str::FromStr;

/// Derived capability on a module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    View,
    Edit,
    FullEdit,
    Create,
    Delete,
}

impl Capability {
    pub const ALL: [Capability; 5] = [
        Capability::View,
        Capability::Edit,
        Capability::FullEdit,
        Capability::Create,
        Capability::Delete,
    ];

    /// Actions any one of which confers this capability.
    pub fn satisfied_by(&self) -> &'static [Action] {
        match self {
            Capability::View => &[Action::View, Action::Edit, Action::FullEdit],
            Capability::Edit => &[Action::Edit, Action::FullEdit],
            Capability::FullEdit => &[Action::FullEdit],
            Capability::Create => &[Action::Create],
            Capability::Delete => &[Action::Delete, Action::FullEdit],
        }
    }
}

/// Anything that can answer "is this exact permission held".
///
/// Everything else is derived from [`Capabilities::grants`].
pub trait Capabilities {
    fn grants(&self, name: PermissionName) -> bool;

    /// String entry point. Malformed or unknown names are not held.
    fn has_permission(&self, name: &str) -> bool {
        PermissionName::parse_lenient(name).is_some_and(|n| self.grants(n))
    }

    /// `false` for an empty list.
    fn has_any_permission(&self, names: &[&str]) -> bool {
        names.iter().any(|n| self.has_permission(n))
    }

    /// `true` for an empty list.
    fn has_all_permissions(&self, names: &[&str]) -> bool {
        names.iter().all(|n| self.has_permission(n))
    }

    fn has_any(&self, names: &[PermissionName]) -> bool {
        names.iter().any(|n| self.grants(*n))
    }

    fn has_all(&self, names: &[PermissionName]) -> bool {
        names.iter().all(|n| self.grants(*n))
    }

    fn can(&self, capability: Capability, module: Module) -> bool {
        capability
            .satisfied_by()
            .iter()
            .any(|action| self.grants(PermissionName::new(module, *action)))
    }

    /// Module given as a string, e.g. from a route parameter.
    fn can_on(&self, capability: Capability, module: &str) -> bool {
        Module::from_str(module).is_ok_and(|m| self.can(capability, m))
    }

    fn can_view(&self, module: Module) -> bool {
        self.can(Capability::View, module)
    }

    fn can_edit(&self, module: Module) -> bool {
        self.can(Capability::Edit, module)
    }

    fn can_full_edit(&self, module: Module) -> bool {
        self.can(Capability::FullEdit, module)
    }

    fn can_create(&self, module: Module) -> bool {
        self.can(Capability::Create, module)
    }

    fn can_delete(&self, module: Module) -> bool {
        self.can(Capability::Delete, module)
    }

    fn module_access(&self, module: Module) -> ModuleAccess {
        ModuleAccess {
            module,
            can_view: self.can_view(module),
            can_edit: self.can_edit(module),
            can_full_edit: self.can_full_edit(module),
            can_create: self.can_create(module),
            can_delete: self.can_delete(module),
        }
    }
}

/// Capability summary for one module, as page code consumes it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ModuleAccess {
    pub module: Module,
    pub can_view: bool,
    pub can_edit: bool,
    pub can_full_edit: bool,
    pub can_create: bool,
    pub can_delete: bool,
}

impl Capabilities for EffectivePermissions {
    fn grants(&self, name: PermissionName) -> bool {
        self.contains(name)
    }
}

impl Capabilities for BTreeSet<PermissionName> {
    fn grants(&self, name: PermissionName) -> bool {
        self.contains(&name)
    }
}

impl Capabilities for HashSet<PermissionName> {
    fn grants(&self, name: PermissionName) -> bool {
        self.contains(&name)
    }
}

impl Capabilities for [PermissionName] {
    fn grants(&self, name: PermissionName) -> bool {
        self.contains(&name)
    }
}

impl Capabilities for Vec<PermissionName> {
    fn grants(&self, name: PermissionName) -> bool {
        self.as_slice().grants(name)
    }
}

impl<C: Capabilities + ?Sized> Capabilities for &C {
    fn grants(&self, name: PermissionName) -> bool {
        (**self).grants(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn set(names: &[&str]) -> BTreeSet<PermissionName> {
        names.iter().map(|n| n.parse().unwrap()).collect()
    }

    #[test]
    fn test_empty_list_boundaries() {
        let perms = set(&["tickets.view"]);
        assert!(!perms.has_any_permission(&[]));
        assert!(perms.has_all_permissions(&[]));
        assert!(!perms.has_any(&[]));
        assert!(perms.has_all(&[]));

        let nothing: BTreeSet<PermissionName> = BTreeSet::new();
        assert!(!nothing.has_any_permission(&[]));
        assert!(nothing.has_all_permissions(&[]));
    }

    #[test]
    fn test_no_permissions_grants_nothing() {
        let perms: BTreeSet<PermissionName> = BTreeSet::new();
        assert!(!perms.has_permission("tickets.view"));
        assert!(!perms.can_view(Module::Tickets));
        for capability in Capability::ALL {
            assert!(!perms.can(capability, Module::Tickets));
        }
    }

    #[rstest]
    #[case("tickets.view", [true, false, false, false, false])]
    #[case("tickets.edit", [true, true, false, false, false])]
    #[case("tickets.full_edit", [true, true, true, false, true])]
    #[case("tickets.create", [false, false, false, true, false])]
    #[case("tickets.delete", [false, false, false, false, true])]
    #[case("tickets.manage", [false, false, false, false, false])]
    fn test_capability_ladder(#[case] held: &str, #[case] expected: [bool; 5]) {
        let perms = set(&[held]);
        let access = perms.module_access(Module::Tickets);
        assert_eq!(
            [
                access.can_view,
                access.can_edit,
                access.can_full_edit,
                access.can_create,
                access.can_delete,
            ],
            expected
        );
    }

    #[test]
    fn test_capability_is_per_module() {
        let perms = set(&["assets.full_edit"]);
        assert!(perms.can_edit(Module::Assets));
        assert!(!perms.can_view(Module::Tickets));
    }

    #[rstest]
    #[case("")]
    #[case("tickets")]
    #[case("tickets.approve")]
    #[case("TICKETS.VIEW")]
    #[case("tickets.view ")]
    fn test_malformed_names_are_not_found(#[case] raw: &str) {
        let perms = set(&["tickets.view"]);
        assert!(!perms.has_permission(raw));
        assert!(!perms.has_any_permission(&[raw]));
        assert!(!perms.has_all_permissions(&["tickets.view", raw]));
    }

    #[test]
    fn test_string_module_queries() {
        let perms = set(&["knowledge_base.edit"]);
        assert!(perms.can_on(Capability::View, "knowledge_base"));
        assert!(!perms.can_on(Capability::View, "knowledge-base"));
        assert!(!perms.can_on(Capability::Delete, "knowledge_base"));
    }

    #[test]
    fn test_slice_and_vec_impls_agree() {
        let names: Vec<PermissionName> = vec!["users.delete".parse().unwrap()];
        assert!(names.can_delete(Module::Users));
        assert!(names.as_slice().can_delete(Module::Users));
        assert!(!names.can_edit(Module::Users));
    }
}
