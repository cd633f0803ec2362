//! Tenant context extraction
//!
//! Derives the tenant/user forwarding context from validated identity claims.
//! Every downstream service relies on tenant scoping for data isolation, so an
//! authenticated request without a tenant claim is a hard authorization
//! failure (403), not a validation warning. Unauthenticated requests pass
//! through unchanged with nothing staged.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use uuid::Uuid;

use super::claims::IdentityClaims;
use crate::utils::error::ErrorResponse;

/// Header carrying the tenant id to destination services
pub const TENANT_HEADER: &str = "X-Tenant-ID";
/// Header carrying the user id to destination services
pub const USER_HEADER: &str = "X-User-ID";

/// Forwarding header values staged for injection by the forwarding transform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantContext {
    pub tenant_id: Uuid,
    pub user_id: String,
}

/// Tenant extraction error types
#[derive(Debug, PartialEq, Eq)]
pub enum TenantError {
    /// Authenticated subject without a tenant claim
    MissingTenantClaim,
}

impl IntoResponse for TenantError {
    fn into_response(self) -> Response {
        let body = ErrorResponse::new(
            "forbidden",
            "Authenticated request does not resolve to a tenant",
        );
        (StatusCode::FORBIDDEN, Json(body)).into_response()
    }
}

/// Stage the tenant/user forwarding headers for an inbound request
///
/// Returns `None` for unauthenticated requests (nothing staged) and fails
/// with [`TenantError::MissingTenantClaim`] when a subject is present but the
/// tenant id is not.
pub fn extract(claims: &IdentityClaims) -> Result<Option<TenantContext>, TenantError> {
    let Some(subject) = claims.subject.as_ref() else {
        return Ok(None);
    };

    let tenant_id = claims.tenant_id.ok_or(TenantError::MissingTenantClaim)?;

    Ok(Some(TenantContext {
        tenant_id,
        user_id: subject.clone(),
    }))
}
