//! Domain models for the authorization engine

pub mod common;
pub mod page_access;
pub mod rbac;
pub mod session;

pub use common::*;
pub use page_access::*;
pub use rbac::*;
pub use session::*;
