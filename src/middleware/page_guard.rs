//! Page access enforcement for HTTP routes
//!
//! Expects an upstream layer to place the caller's [`Session`] in the
//! request extensions. On success the resolved
//! [`EffectivePermissions`](crate::policy::EffectivePermissions) is inserted
//! for handlers to use.

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use crate::domain::Session;
use crate::error::AppError;
use crate::policy::{AccessDecision, PageAccessGate};
use crate::repository::RbacRepository;
use crate::service::PermissionResolver;

/// Shared state for the page guard middleware
pub struct PageGuardState<R: RbacRepository> {
    gate: Arc<PageAccessGate>,
    resolver: PermissionResolver<R>,
}

impl<R: RbacRepository> Clone for PageGuardState<R> {
    fn clone(&self) -> Self {
        Self {
            gate: self.gate.clone(),
            resolver: self.resolver.clone(),
        }
    }
}

impl<R: RbacRepository> PageGuardState<R> {
    pub fn new(gate: Arc<PageAccessGate>, resolver: PermissionResolver<R>) -> Self {
        Self { gate, resolver }
    }
}

/// 401 without a session, 503 when permissions cannot be loaded, 403 when
/// the gate denies.
pub async fn page_guard_middleware<R>(
    State(state): State<PageGuardState<R>>,
    mut request: Request<Body>,
    next: Next,
) -> Response
where
    R: RbacRepository + 'static,
{
    let path = request.uri().path().to_string();

    let session = request.extensions().get::<Session>().cloned();

    let permissions = match state.resolver.resolve_session(session.as_ref()).await {
        Ok(permissions) => permissions,
        Err(e) => return e.into_response(),
    };

    match state.gate.decide(&path, session.as_ref(), &permissions) {
        AccessDecision::Allow => {
            request.extensions_mut().insert(permissions);
            next.run(request).await
        }
        AccessDecision::DenyUnauthenticated => {
            AppError::Unauthorized("Authentication required".to_string()).into_response()
        }
        AccessDecision::DenyForbidden => {
            let label = state
                .gate
                .matching_rule(&path)
                .map(|rule| rule.label.clone())
                .unwrap_or_else(|| path.clone());
            AppError::Forbidden(format!("You do not have permission to access {}", label))
                .into_response()
        }
    }
}
