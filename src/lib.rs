//! Kroolo Authz - permission resolution and page access control
//!
//! This crate resolves a user's effective permissions from roles and
//! per-user overrides, answers capability and scope queries over them, and
//! gates application pages by profile role and permission.

pub mod config;
pub mod domain;
pub mod error;
pub mod guard;
pub mod middleware;
pub mod migration;
pub mod policy;
pub mod repository;
pub mod service;
pub mod telemetry;

// Re-export commonly used types
pub use config::Config;
pub use error::{AppError, Result};
pub use policy::{Capabilities, EffectivePermissions, PageAccessGate};
pub use service::{PermissionResolver, RbacService};
