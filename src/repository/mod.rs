//! Data access layer (Repository pattern)

pub mod rbac;

pub use rbac::{RbacRepository, RbacRepositoryImpl};
