//! Gateway-local API endpoints
//!
//! Everything else the gateway serves is proxied; these endpoints answer
//! locally and are never forwarded.

pub mod health;

use axum::{routing::get, Router};

use crate::AppState;

/// Routes served by the gateway itself
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/health/detailed", get(health::health_check_detailed))
}
