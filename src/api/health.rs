//! Health check endpoints
//!
//! Provides health check endpoints for monitoring and load balancers.

use axum::{extract::State, Json};
use serde::Serialize;

use crate::AppState;

/// Basic health response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Detailed health response with configuration summary
#[derive(Serialize)]
pub struct DetailedHealthResponse {
    pub status: String,
    pub version: String,
    pub identity_provider: IdentityProviderStatus,
    pub clusters: Vec<ClusterStatus>,
}

/// Identity provider configuration summary
#[derive(Serialize)]
pub struct IdentityProviderStatus {
    /// `discovery` (JWKS via well-known document) or `shared-secret`
    pub validation_mode: String,
    pub exchange_configured: bool,
}

/// One configured destination cluster
#[derive(Serialize)]
pub struct ClusterStatus {
    pub id: String,
    pub exchange_audience: Option<String>,
}

/// Simple health check endpoint (for load balancers)
///
/// Returns 200 OK if the service is running.
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Detailed health check endpoint
///
/// Reports the static gateway configuration: validation mode and the
/// configured destination clusters. Never includes secrets or endpoints.
pub async fn health_check_detailed(State(state): State<AppState>) -> Json<DetailedHealthResponse> {
    let config = &state.config;

    let validation_mode = if config.auth.jwt_secret.is_some() {
        "shared-secret"
    } else {
        "discovery"
    };

    let mut clusters: Vec<ClusterStatus> = config
        .clusters
        .iter()
        .map(|(id, c)| ClusterStatus {
            id: id.clone(),
            exchange_audience: c.audience.clone(),
        })
        .collect();
    clusters.sort_by(|a, b| a.id.cmp(&b.id));

    Json(DetailedHealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        identity_provider: IdentityProviderStatus {
            validation_mode: validation_mode.to_string(),
            exchange_configured: clusters.iter().any(|c| c.exchange_audience.is_some()),
        },
        clusters,
    })
}
