//! Route authorization policy evaluation
//!
//! Matches the caller's identity claims against the route's named policy.
//! Evaluation is a pure function of claims plus static configuration; a deny
//! is terminal before any token exchange or downstream I/O is spent on the
//! request.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use super::claims::IdentityClaims;
use crate::config::PolicyConfig;
use crate::utils::error::ErrorResponse;

/// A named, process-lifetime route policy
///
/// Attaching a policy to a route requires authentication. `required_roles`
/// has OR semantics: any one matching role suffices. An empty set means
/// "authenticated only".
#[derive(Debug, Clone)]
pub struct RoutePolicy {
    pub name: String,
    pub required_roles: Vec<String>,
    pub require_tenant: bool,
}

impl RoutePolicy {
    pub fn from_config(name: &str, config: &PolicyConfig) -> Self {
        Self {
            name: name.to_string(),
            required_roles: config.required_roles.clone(),
            require_tenant: config.require_tenant,
        }
    }
}

/// Policy evaluation error types
#[derive(Debug, PartialEq, Eq)]
pub enum PolicyError {
    /// The route requires authentication and none was presented
    NotAuthenticated,
    /// The caller's roles do not intersect the required set
    RoleDenied { policy: String },
    /// The policy requires a tenant and the claims carry none
    TenantRequired { policy: String },
}

impl IntoResponse for PolicyError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match &self {
            PolicyError::NotAuthenticated => (
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                "Authentication required".to_string(),
            ),
            PolicyError::RoleDenied { policy } => (
                StatusCode::FORBIDDEN,
                "forbidden",
                format!("Caller roles do not satisfy policy {policy}"),
            ),
            PolicyError::TenantRequired { policy } => (
                StatusCode::FORBIDDEN,
                "forbidden",
                format!("Policy {policy} requires a tenant context"),
            ),
        };

        let body = ErrorResponse::new(error_type, message);
        (status, Json(body)).into_response()
    }
}

/// Evaluate a route's policy against the caller's claims
///
/// A route without a policy allows unconditionally; that opt-out is explicit
/// in configuration, never a silent default.
pub fn evaluate(policy: Option<&RoutePolicy>, claims: &IdentityClaims) -> Result<(), PolicyError> {
    let Some(policy) = policy else {
        return Ok(());
    };

    if !claims.is_authenticated() {
        return Err(PolicyError::NotAuthenticated);
    }

    if !policy.required_roles.is_empty() && !claims.has_any_role(&policy.required_roles) {
        return Err(PolicyError::RoleDenied {
            policy: policy.name.clone(),
        });
    }

    if policy.require_tenant && claims.tenant_id.is_none() {
        return Err(PolicyError::TenantRequired {
            policy: policy.name.clone(),
        });
    }

    Ok(())
}
