//! Identity provider discovery
//!
//! Resolves the provider's token endpoint and token-signing keys from its
//! OIDC well-known discovery document. Resolution happens once at startup;
//! the resulting metadata is immutable for the process lifetime (key rotation
//! requires a restart).

use anyhow::{bail, Context, Result};
use jsonwebtoken::{jwk::JwkSet, Algorithm, DecodingKey};
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::{AuthConfig, IdentityProviderConfig};
use crate::gateway::claims::KeyStore;

/// The subset of the OIDC discovery document the gateway needs
#[derive(Debug, Clone, Deserialize)]
pub struct DiscoveryDocument {
    pub issuer: Option<String>,
    pub token_endpoint: Option<String>,
    pub jwks_uri: Option<String>,
}

/// Provider metadata resolved at startup
pub struct ProviderMetadata {
    /// Token endpoint for RFC 8693 exchange calls, if known
    pub token_endpoint: Option<String>,
    /// Key material for inbound credential validation
    pub keys: KeyStore,
}

/// Fetch the discovery document from the provider
pub async fn fetch_discovery(client: &Client, url: &str) -> Result<DiscoveryDocument> {
    let document: DiscoveryDocument = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("Failed to fetch discovery document from {url}"))?
        .error_for_status()
        .context("Discovery endpoint returned an error status")?
        .json()
        .await
        .context("Failed to parse discovery document")?;

    info!(
        issuer = document.issuer.as_deref().unwrap_or("unknown"),
        "Fetched identity provider discovery document"
    );
    Ok(document)
}

/// Fetch the provider's JWKS and build a validation key store
pub async fn fetch_jwks(client: &Client, jwks_uri: &str) -> Result<KeyStore> {
    let jwks: JwkSet = client
        .get(jwks_uri)
        .send()
        .await
        .with_context(|| format!("Failed to fetch JWKS from {jwks_uri}"))?
        .error_for_status()
        .context("JWKS endpoint returned an error status")?
        .json()
        .await
        .context("Failed to parse JWKS")?;

    let mut keys: HashMap<String, (Algorithm, DecodingKey)> = HashMap::new();
    for jwk in &jwks.keys {
        let Some(kid) = jwk.common.key_id.clone() else {
            warn!("Skipping JWKS key without a kid");
            continue;
        };
        let key = match DecodingKey::from_jwk(jwk) {
            Ok(key) => key,
            Err(e) => {
                warn!(kid = %kid, error = %e, "Skipping unusable JWKS key");
                continue;
            }
        };
        let algorithm = jwk
            .common
            .key_algorithm
            .and_then(|alg| Algorithm::from_str(&alg.to_string()).ok())
            .unwrap_or(Algorithm::RS256);
        keys.insert(kid, (algorithm, key));
    }

    if keys.is_empty() {
        bail!("JWKS at {jwks_uri} contained no usable signing keys");
    }

    info!(key_count = keys.len(), "Loaded provider signing keys");
    Ok(KeyStore::Jwks(keys))
}

/// Resolve provider metadata from configuration
///
/// Uses the configured shared secret and explicit token endpoint when present;
/// anything still missing is resolved from the discovery document.
pub async fn resolve(idp: &IdentityProviderConfig, auth: &AuthConfig) -> Result<ProviderMetadata> {
    let mut token_endpoint = idp.token_endpoint.clone();
    let mut keys = auth
        .jwt_secret
        .as_ref()
        .map(|secret| KeyStore::Secret(DecodingKey::from_secret(secret.as_bytes())));

    if keys.is_none() || token_endpoint.is_none() {
        let discovery_url = idp
            .discovery_url
            .as_ref()
            .context("identity_provider.discovery_url is required to resolve provider metadata")?;

        let client = Client::builder()
            .timeout(Duration::from_secs(idp.timeout_secs))
            .use_rustls_tls()
            .build()
            .context("Failed to create discovery HTTP client")?;

        let document = fetch_discovery(&client, discovery_url).await?;

        if token_endpoint.is_none() {
            token_endpoint = document.token_endpoint.clone();
        }
        if keys.is_none() {
            let jwks_uri = document
                .jwks_uri
                .as_ref()
                .context("Discovery document does not advertise a jwks_uri")?;
            keys = Some(fetch_jwks(&client, jwks_uri).await?);
        }
    }

    let keys = keys.context("No token validation keys resolved")?;
    Ok(ProviderMetadata {
        token_endpoint,
        keys,
    })
}
