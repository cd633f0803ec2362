//! Showgate
//!
//! Backend-for-Frontend gateway for the multi-tenant competition platform.
//! Authenticates inbound requests, establishes tenant and user identity,
//! enforces route policies, exchanges the caller's gateway-audience token for
//! per-service credentials (RFC 8693), and proxies to the destination
//! clusters.

use std::sync::Arc;

pub mod api;
pub mod config;
pub mod gateway;
pub mod middleware;
pub mod services;
pub mod utils;

pub use config::AppConfig;
pub use gateway::claims::{CredentialValidator, IdentityClaims, KeyStore};
pub use gateway::GatewayPipeline;

/// Application state shared across handlers
///
/// Everything in here is built once at startup and read-only afterwards.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<AppConfig>,
    /// The request-processing pipeline
    pub pipeline: Arc<GatewayPipeline>,
}

/// Build the gateway router: local endpoints plus the proxy fallback
pub fn build_router(state: AppState) -> axum::Router {
    use axum::http::HeaderValue;
    use tower_http::cors::{Any, CorsLayer};
    use tower_http::trace::TraceLayer;

    let mut router = api::routes()
        .fallback(gateway::proxy_handler)
        .layer(axum::middleware::from_fn(
            middleware::security_headers_middleware,
        ))
        .layer(TraceLayer::new_for_http());

    if !state.config.cors.allowed_origins.is_empty() {
        let origins: Vec<HeaderValue> = state
            .config
            .cors
            .allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        router = router.layer(
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods(Any)
                .allow_headers(Any),
        );
    }

    router.with_state(state)
}
