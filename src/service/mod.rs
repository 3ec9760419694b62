//! Business logic layer

pub mod rbac;
pub mod resolver;

pub use rbac::RbacService;
pub use resolver::PermissionResolver;
