//! Credential validation
//!
//! Validates inbound bearer tokens (signature, expiry, audience) and extracts
//! the per-request identity claims. A request without a token is a distinct
//! state, not an error: it yields anonymous claims and is handled entirely by
//! the route policy evaluation.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use std::collections::HashMap;
use uuid::Uuid;

use crate::utils::error::ErrorResponse;

/// Identity derived from a validated token
///
/// Created once per request after successful validation, discarded at the end
/// of the request; never persisted or shared across requests.
#[derive(Debug, Clone, Default)]
pub struct IdentityClaims {
    /// Opaque user id (`sub` claim); `None` for unauthenticated requests
    pub subject: Option<String>,
    /// Tenant id (`tenant_id` claim); may be absent even when authenticated
    pub tenant_id: Option<Uuid>,
    /// Role names carried by the token
    pub roles: Vec<String>,
    /// Audience the token was issued for (always the gateway's own audience
    /// after validation)
    pub audience: Option<String>,
}

impl IdentityClaims {
    /// Claims for a request that presented no credential
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn is_authenticated(&self) -> bool {
        self.subject.is_some()
    }

    /// Whether the caller holds at least one of the given roles
    pub fn has_any_role(&self, required: &[String]) -> bool {
        self.roles.iter().any(|r| required.contains(r))
    }
}

/// Raw JWT claims as they appear on the wire
#[derive(Debug, Clone, Deserialize)]
struct Claims {
    /// Subject (user id)
    sub: String,
    /// Audience; providers emit either a single string or an array. The
    /// value itself is checked by the JWT library during decode.
    #[allow(dead_code)]
    aud: Audience,
    /// Tenant id
    #[serde(default)]
    tenant_id: Option<String>,
    /// Role names
    #[serde(default)]
    roles: Vec<String>,
    /// Expiration timestamp (validated by the JWT library)
    #[allow(dead_code)]
    exp: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum Audience {
    Single(String),
    Multiple(Vec<String>),
}


/// Credential validation error types
#[derive(Debug, PartialEq, Eq)]
pub enum AuthError {
    /// Token is malformed or carries unusable claims
    InvalidToken,
    /// Token expiry is in the past
    ExpiredToken,
    /// Signature does not verify against the provider's keys
    BadSignature,
    /// Token was issued for a different audience than this gateway
    WrongAudience,
}

impl AuthError {
    fn message(&self) -> &'static str {
        match self {
            AuthError::InvalidToken => "Invalid authentication token",
            AuthError::ExpiredToken => "Authentication token has expired",
            AuthError::BadSignature => "Authentication token signature is invalid",
            AuthError::WrongAudience => "Authentication token audience is not accepted here",
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let body = ErrorResponse::new("unauthorized", self.message());
        (StatusCode::UNAUTHORIZED, Json(body)).into_response()
    }
}

/// Key material used to verify token signatures
///
/// Resolved once at startup and immutable thereafter.
pub enum KeyStore {
    /// Shared HS256 secret (development mode)
    Secret(DecodingKey),
    /// JWKS keys from the provider's discovery document, keyed by `kid`
    Jwks(HashMap<String, (Algorithm, DecodingKey)>),
}

/// Validates inbound bearer tokens against the gateway's own audience
pub struct CredentialValidator {
    keys: KeyStore,
    expected_audience: String,
}

impl CredentialValidator {
    pub fn new(keys: KeyStore, expected_audience: impl Into<String>) -> Self {
        Self {
            keys,
            expected_audience: expected_audience.into(),
        }
    }

    /// Validate a raw bearer token and extract identity claims
    ///
    /// No claim is trusted before the whole token verified: signature, expiry,
    /// and audience are all checked here, in the JWT library, before any field
    /// is read out.
    pub fn validate(&self, token: &str) -> Result<IdentityClaims, AuthError> {
        let header = decode_header(token).map_err(|_| AuthError::InvalidToken)?;

        let (algorithm, key) = match &self.keys {
            KeyStore::Secret(key) => (Algorithm::HS256, key),
            KeyStore::Jwks(keys) => {
                let kid = header.kid.as_deref().ok_or(AuthError::InvalidToken)?;
                let (alg, key) = keys.get(kid).ok_or(AuthError::BadSignature)?;
                (*alg, key)
            }
        };

        let mut validation = Validation::new(algorithm);
        validation.set_audience(&[&self.expected_audience]);
        validation.set_required_spec_claims(&["exp", "aud"]);

        let data = decode::<Claims>(token, key, &validation).map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::ExpiredToken,
            jsonwebtoken::errors::ErrorKind::InvalidSignature => AuthError::BadSignature,
            jsonwebtoken::errors::ErrorKind::InvalidAudience => AuthError::WrongAudience,
            jsonwebtoken::errors::ErrorKind::MissingRequiredClaim(claim) if claim == "aud" => {
                AuthError::WrongAudience
            }
            _ => AuthError::InvalidToken,
        })?;

        let claims = data.claims;
        let tenant_id = match claims.tenant_id.as_deref() {
            Some(raw) => Some(Uuid::parse_str(raw).map_err(|_| AuthError::InvalidToken)?),
            None => None,
        };

        Ok(IdentityClaims {
            subject: Some(claims.sub),
            tenant_id,
            roles: claims.roles,
            audience: Some(self.expected_audience.clone()),
        })
    }
}

/// Extract a bearer token from an Authorization header value
pub fn extract_bearer_token(auth_header: &str) -> Option<&str> {
    auth_header
        .strip_prefix("Bearer ")
        .or_else(|| auth_header.strip_prefix("bearer "))
}
