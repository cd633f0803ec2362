//! Token exchange client
//!
//! Implements OAuth 2.0 Token Exchange (RFC 8693) against the identity
//! provider's token endpoint. The gateway acts as a confidential client and
//! trades the caller's gateway-audience token for a token scoped to a
//! destination service's audience.
//!
//! Exchanges are performed fresh per forwarded request; nothing is cached
//! across requests. Retry policy is the caller's concern, not this client's.

use anyhow::{Context, Result};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::config::IdentityProviderConfig;

const GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:token-exchange";
const ACCESS_TOKEN_TYPE: &str = "urn:ietf:params:oauth:token-type:access_token";

/// Result of a successful exchange; transient, never cached
#[derive(Debug, Clone)]
pub struct ExchangeResult {
    pub access_token: String,
    pub expires_in: Option<u64>,
}

/// Token exchange error types
#[derive(Debug, Error)]
pub enum ExchangeError {
    /// Empty subject token or audience; failed fast without a network call
    #[error("invalid exchange argument: {0}")]
    InvalidArgument(&'static str),
    /// The identity provider rejected the exchange (4xx/5xx)
    #[error("identity provider rejected the exchange ({status}): {error}")]
    Rejected { status: u16, error: String },
    /// 200 response without the expected access token field
    #[error("identity provider returned a malformed exchange response")]
    MalformedResponse,
    /// Transport-level failure talking to the identity provider
    #[error("failed to reach the identity provider: {0}")]
    Network(#[from] reqwest::Error),
}

/// Success body of an exchange response
#[derive(Debug, Deserialize)]
struct ExchangeResponse {
    access_token: Option<String>,
    #[allow(dead_code)]
    token_type: Option<String>,
    expires_in: Option<u64>,
}

/// Error body of a rejected exchange, best-effort parsed
#[derive(Debug, Deserialize)]
struct ExchangeErrorResponse {
    error: Option<String>,
}

/// RFC 8693 client against the identity provider's token endpoint
pub struct TokenExchangeClient {
    client: Client,
    token_endpoint: String,
    client_id: String,
    client_secret: String,
}

impl TokenExchangeClient {
    /// Create a new exchange client for the given token endpoint
    pub fn new(config: &IdentityProviderConfig, token_endpoint: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .use_rustls_tls()
            .build()
            .context("Failed to create identity provider HTTP client")?;

        Ok(Self {
            client,
            token_endpoint,
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
        })
    }

    /// Exchange the caller's token for one scoped to `target_audience`
    pub async fn exchange(
        &self,
        subject_token: &str,
        target_audience: &str,
    ) -> Result<ExchangeResult, ExchangeError> {
        if subject_token.is_empty() {
            return Err(ExchangeError::InvalidArgument("subject token is empty"));
        }
        if target_audience.is_empty() {
            return Err(ExchangeError::InvalidArgument("target audience is empty"));
        }

        let params = [
            ("grant_type", GRANT_TYPE),
            ("subject_token", subject_token),
            ("subject_token_type", ACCESS_TOKEN_TYPE),
            ("audience", target_audience),
            ("requested_token_type", ACCESS_TOKEN_TYPE),
        ];

        let response = self
            .client
            .post(&self.token_endpoint)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&params)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error = response
                .json::<ExchangeErrorResponse>()
                .await
                .ok()
                .and_then(|body| body.error)
                .unwrap_or_else(|| "unknown".to_string());
            return Err(ExchangeError::Rejected {
                status: status.as_u16(),
                error,
            });
        }

        let body: ExchangeResponse = response
            .json()
            .await
            .map_err(|_| ExchangeError::MalformedResponse)?;

        let access_token = body.access_token.ok_or(ExchangeError::MalformedResponse)?;
        debug!(audience = target_audience, "Token exchange succeeded");

        Ok(ExchangeResult {
            access_token,
            expires_in: body.expires_in,
        })
    }
}
