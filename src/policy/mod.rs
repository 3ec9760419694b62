//! Pure authorization decisions.
//!
//! Nothing in this module performs I/O. The resolver in
//! [`crate::service::resolver`] produces an [`EffectivePermissions`]; the
//! functions here answer questions about it.

pub mod capability;
pub mod catalog;
pub mod effective;
pub mod page_access;
pub mod scope;

pub use capability::{Capabilities, Capability, ModuleAccess};
pub use catalog::{catalog, system_role_levels, PermissionCatalog, CATALOG_VERSION};
pub use effective::{EffectivePermission, EffectivePermissions, PermissionRow, Provenance};
pub use page_access::{default_rules, AccessDecision, MatchStrategy, PageAccessGate, ShadowedRule};
pub use scope::{ResourceRef, ScopeSet};

use crate::domain::{PermissionName, UserContext};

/// Whether `permissions` holds `permission` with a scope covering `resource`.
///
/// A permission that is not held is never in scope.
pub fn in_scope(
    permissions: &EffectivePermissions,
    permission: PermissionName,
    resource: &ResourceRef,
    user: &UserContext,
) -> bool {
    permissions.in_scope(permission, resource, user)
}

/// String-named variant of [`in_scope`]; malformed names are never in scope.
pub fn in_scope_named(
    permissions: &EffectivePermissions,
    permission: &str,
    resource: &ResourceRef,
    user: &UserContext,
) -> bool {
    PermissionName::parse_lenient(permission)
        .is_some_and(|name| permissions.in_scope(name, resource, user))
}
