//! HTTP middleware

pub mod page_guard;

pub use page_guard::{page_guard_middleware, PageGuardState};
