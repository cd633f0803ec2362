//! Request-processing pipeline
//!
//! One [`GatewayPipeline`] is built at startup and shared read-only across
//! all requests. Per request it threads an immutable context through the
//! stages: credential validation, tenant extraction, policy evaluation,
//! audience resolution, token exchange, forwarding transform, and finally the
//! proxy core. Every authorization decision completes before any network call
//! is issued on behalf of the request.

pub mod claims;
pub mod policy;
pub mod routes;
pub mod tenant;

use axum::{
    body::Body,
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap, HeaderValue},
    response::{IntoResponse, Response},
};
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::config::{AppConfig, ClusterConfig};
use crate::services::proxy::{is_hop_by_hop, ProxyCore};
use crate::services::token_exchange::TokenExchangeClient;
use crate::utils::error::AppError;
use crate::AppState;

use claims::{extract_bearer_token, AuthError, CredentialValidator, IdentityClaims};
use policy::RoutePolicy;
use routes::RouteTable;
use tenant::{TenantContext, TENANT_HEADER, USER_HEADER};

/// Maps destination clusters to the audience their services expect
///
/// A cluster without an entry requires no exchange: the original credential
/// is forwarded unchanged. That is an explicit configuration state, not a
/// fallback.
pub struct AudienceResolver {
    audiences: HashMap<String, String>,
}

impl AudienceResolver {
    pub fn from_clusters(clusters: &HashMap<String, ClusterConfig>) -> Self {
        let audiences = clusters
            .iter()
            .filter_map(|(id, c)| c.audience.as_ref().map(|aud| (id.clone(), aud.clone())))
            .collect();
        Self { audiences }
    }

    /// Target audience for a cluster, or `None` when no exchange is configured
    pub fn resolve(&self, cluster: &str) -> Option<&str> {
        self.audiences.get(cluster).map(String::as_str)
    }
}

/// Immutable per-request context threaded through the pipeline stages
struct RequestContext {
    claims: IdentityClaims,
    tenant: Option<TenantContext>,
}

/// The request-processing pipeline, built once at startup
pub struct GatewayPipeline {
    validator: CredentialValidator,
    routes: RouteTable,
    policies: HashMap<String, RoutePolicy>,
    audiences: AudienceResolver,
    exchange: Option<TokenExchangeClient>,
    proxy: ProxyCore,
}

impl GatewayPipeline {
    pub fn new(
        config: &AppConfig,
        validator: CredentialValidator,
        exchange: Option<TokenExchangeClient>,
        proxy: ProxyCore,
    ) -> Self {
        let policies = config
            .policies
            .iter()
            .map(|(name, p)| (name.clone(), RoutePolicy::from_config(name, p)))
            .collect();

        Self {
            validator,
            routes: RouteTable::new(&config.routes),
            policies,
            audiences: AudienceResolver::from_clusters(&config.clusters),
            exchange,
            proxy,
        }
    }

    /// Run the full pipeline for one inbound request
    pub async fn handle(&self, request: Request) -> Response {
        match self.process(request).await {
            Ok(response) => response,
            Err(response) => response,
        }
    }

    async fn process(&self, request: Request) -> Result<Response, Response> {
        let path = request.uri().path().to_string();

        let route = self
            .routes
            .resolve(&path)
            .ok_or_else(|| AppError::NotFound(format!("No route for {path}")).into_response())?;

        // Stage 1: credential validation. A missing token is a distinct
        // state, not an error; policy evaluation decides whether it matters.
        let bearer = bearer_token(request.headers()).map_err(IntoResponse::into_response)?;
        let claims = match bearer.as_deref() {
            Some(token) => self
                .validator
                .validate(token)
                .map_err(IntoResponse::into_response)?,
            None => IdentityClaims::anonymous(),
        };

        // Stage 2: tenant context. Terminal for authenticated requests
        // without a tenant; nothing staged for anonymous ones.
        let tenant = tenant::extract(&claims).map_err(IntoResponse::into_response)?;

        // Stage 3: route policy. Resolved fully before any network call is
        // spent on exchange or proxying.
        let route_policy = route.policy.as_ref().and_then(|p| self.policies.get(p));
        policy::evaluate(route_policy, &claims).map_err(IntoResponse::into_response)?;

        let context = RequestContext { claims, tenant };
        debug!(
            path = %path,
            cluster = %route.cluster,
            subject = context.claims.subject.as_deref().unwrap_or("-"),
            "Request authorized"
        );

        // Stages 4-5: audience resolution and token exchange.
        let target_audience = self.audiences.resolve(&route.cluster);
        let (parts, body) = request.into_parts();

        let authorization = self
            .upstream_authorization(bearer.as_deref(), target_audience, &parts.headers)
            .await;

        // Stage 6: forwarding transform, applied to a fresh header map.
        let mut headers = filter_forwarding_headers(&parts.headers);
        if let Some(ref tenant) = context.tenant {
            stage_identity_headers(&mut headers, tenant);
        }
        if let Some(value) = authorization {
            headers.insert(AUTHORIZATION, value);
        }

        // Stage 7: proxy core.
        let path_and_query = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or(&path)
            .to_string();

        self.proxy
            .forward(&route.cluster, parts.method, &path_and_query, headers, body)
            .await
            .map_err(|e| AppError::from(e).into_response())
    }

    /// Decide the outbound Authorization header
    ///
    /// When the route's cluster has an exchange audience, the caller's token
    /// is exchanged and the header replaced. On exchange failure the request
    /// is forwarded WITHOUT an Authorization header: the original token is
    /// never passed through as if trusted for the target audience, and the
    /// destination's own audience check rejects the request with 401.
    async fn upstream_authorization(
        &self,
        bearer: Option<&str>,
        target_audience: Option<&str>,
        inbound: &HeaderMap,
    ) -> Option<HeaderValue> {
        let Some(audience) = target_audience else {
            // No exchange configured for this cluster: forward the original
            // credential unchanged.
            return inbound.get(AUTHORIZATION).cloned();
        };

        let token = bearer?;

        let Some(exchange) = self.exchange.as_ref() else {
            warn!(audience, "No exchange client configured; stripping Authorization");
            return None;
        };

        match exchange.exchange(token, audience).await {
            Ok(result) => HeaderValue::from_str(&format!("Bearer {}", result.access_token)).ok(),
            Err(e) => {
                warn!(
                    audience,
                    error = %e,
                    "Token exchange failed; forwarding without Authorization"
                );
                None
            }
        }
    }
}

/// Pull the bearer token out of the Authorization header
///
/// A present but non-bearer Authorization header is an invalid credential,
/// not an anonymous request.
fn bearer_token(headers: &HeaderMap) -> Result<Option<String>, AuthError> {
    let Some(value) = headers.get(AUTHORIZATION) else {
        return Ok(None);
    };
    let value = value.to_str().map_err(|_| AuthError::InvalidToken)?;
    let token = extract_bearer_token(value).ok_or(AuthError::InvalidToken)?;
    Ok(Some(token.to_string()))
}

/// Copy inbound headers, dropping everything the gateway owns
///
/// Hop-by-hop headers stay on the inbound connection; Authorization is
/// decided separately; client-supplied tenant/user identity headers are
/// always stripped so callers cannot spoof the values this gateway derives
/// from validated claims.
fn filter_forwarding_headers(inbound: &HeaderMap) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(inbound.len());
    for (name, value) in inbound {
        if is_hop_by_hop(name) {
            continue;
        }
        let lowered = name.as_str();
        if lowered.eq_ignore_ascii_case(AUTHORIZATION.as_str())
            || lowered.eq_ignore_ascii_case(TENANT_HEADER)
            || lowered.eq_ignore_ascii_case(USER_HEADER)
        {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }
    headers
}

/// Inject the staged tenant/user headers
fn stage_identity_headers(headers: &mut HeaderMap, tenant: &TenantContext) {
    if let Ok(value) = HeaderValue::from_str(&tenant.tenant_id.to_string()) {
        headers.insert(TENANT_HEADER, value);
    }
    if let Ok(value) = HeaderValue::from_str(&tenant.user_id) {
        headers.insert(USER_HEADER, value);
    }
}

/// Fallback handler delegating every unrouted request to the pipeline
pub async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    state.pipeline.handle(request).await
}
