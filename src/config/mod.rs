//! Configuration management
//!
//! This module provides YAML-based configuration management with support for:
//! - Environment variable overrides
//! - Multiple configuration file locations
//! - Default values for all settings
//! - Typed route, policy, and cluster tables validated once at startup
//!
//! All tables are immutable for the lifetime of the process; there is no
//! runtime mutation API.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    /// Identity provider the gateway is a confidential client of
    pub identity_provider: IdentityProviderConfig,
    pub auth: AuthConfig,
    /// Destination clusters keyed by logical cluster id
    pub clusters: HashMap<String, ClusterConfig>,
    /// Route table, matched most-specific-prefix-first
    pub routes: Vec<RouteConfig>,
    /// Named route policies referenced by the route table
    #[serde(default)]
    pub policies: HashMap<String, PolicyConfig>,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub cors: CorsConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5080
}

/// Identity provider (OAuth2/OIDC) configuration
///
/// The gateway authenticates to the token endpoint with its own confidential
/// client credentials when performing RFC 8693 token exchange. Either
/// `discovery_url` is set (token endpoint and signing keys are resolved from
/// the well-known document at startup) or `token_endpoint` is set explicitly
/// together with `auth.jwt_secret` (development mode).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IdentityProviderConfig {
    /// OIDC discovery document URL (`.../.well-known/openid-configuration`)
    #[serde(default)]
    pub discovery_url: Option<String>,
    /// Explicit token endpoint, overriding the discovered one
    #[serde(default)]
    pub token_endpoint: Option<String>,
    /// Confidential client id used for token exchange
    pub client_id: String,
    /// Confidential client secret used for token exchange
    #[serde(default)]
    pub client_secret: String,
    /// Timeout for calls to the identity provider
    #[serde(default = "default_idp_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_idp_timeout_secs() -> u64 {
    10
}

/// Inbound credential validation configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    /// Audience claim value inbound tokens must carry for this gateway
    pub expected_audience: String,
    /// Shared HS256 secret for token validation (development mode only;
    /// production deployments resolve RSA keys via OIDC discovery)
    #[serde(default)]
    pub jwt_secret: Option<String>,
}

/// A destination cluster the gateway can forward to
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClusterConfig {
    /// Base URL the matched path is appended to
    pub base_url: String,
    /// Audience the destination service expects. When set, each forwarded
    /// request performs an RFC 8693 exchange for a token scoped to this
    /// audience. When absent the original credential is forwarded unchanged
    /// (an explicit configuration state, not a fallback).
    #[serde(default)]
    pub audience: Option<String>,
    /// Per-request timeout when forwarding to this cluster
    #[serde(default = "default_cluster_timeout_secs")]
    pub timeout_secs: u64,
    /// Idle lifetime of pooled connections to this cluster
    #[serde(default = "default_pool_idle_secs")]
    pub pool_idle_timeout_secs: u64,
    /// Upper bound on idle pooled connections per host
    #[serde(default = "default_pool_max_idle")]
    pub pool_max_idle_per_host: usize,
}

fn default_cluster_timeout_secs() -> u64 {
    30
}

fn default_pool_idle_secs() -> u64 {
    90
}

fn default_pool_max_idle() -> usize {
    32
}

/// A single entry in the route table
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouteConfig {
    /// Path prefix, matched on segment boundaries
    pub prefix: String,
    /// Destination cluster id (must exist in `clusters`)
    pub cluster: String,
    /// Policy name (must exist in `policies`). A route without a policy is
    /// forwarded unconditionally; that opt-out is visible here, never implied.
    #[serde(default)]
    pub policy: Option<String>,
}

/// A named route authorization policy
///
/// Attaching any policy to a route requires authentication. An empty
/// `required_roles` set means "authenticated only"; a non-empty set is
/// satisfied by any one matching role.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PolicyConfig {
    #[serde(default)]
    pub required_roles: Vec<String>,
    #[serde(default)]
    pub require_tenant: bool,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
    #[serde(default)]
    pub target: LogTarget,
    /// Directory for file logging (used when target is `file` or `both`)
    #[serde(default = "default_log_dir")]
    pub directory: PathBuf,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            target: LogTarget::default(),
            directory: default_log_dir(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

/// Log output format
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Compact,
    Json,
}

/// Log output target
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogTarget {
    #[default]
    Console,
    File,
    Both,
}

/// CORS configuration for the single-page client
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CorsConfig {
    /// Allowed origins; empty means same-origin only (no CORS headers)
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

impl AppConfig {
    /// Load configuration from file and environment variables
    ///
    /// Configuration is loaded in the following order (later overrides earlier):
    /// 1. Configuration file (YAML)
    /// 2. Environment variables (prefixed with SHOWGATE_)
    pub fn load() -> Result<Self> {
        // Try to load .env file if it exists
        let _ = dotenvy::dotenv();

        let config_path = std::env::var("SHOWGATE_CONFIG")
            .map(PathBuf::from)
            .ok()
            .or_else(Self::find_config_file);

        let path = config_path
            .context("No configuration file found (set SHOWGATE_CONFIG or create config.yaml)")?;

        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let mut config: AppConfig = serde_norway::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Find the configuration file in standard locations
    fn find_config_file() -> Option<PathBuf> {
        let paths = [
            PathBuf::from("config.yaml"),
            PathBuf::from("config/config.yaml"),
            PathBuf::from("/etc/showgate/config.yaml"),
        ];

        paths.into_iter().find(|p| p.exists())
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("SHOWGATE_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("SHOWGATE_PORT") {
            if let Ok(p) = port.parse() {
                self.server.port = p;
            }
        }
        if let Ok(secret) = std::env::var("SHOWGATE_CLIENT_SECRET") {
            self.identity_provider.client_secret = secret;
        }
        if let Ok(secret) = std::env::var("SHOWGATE_JWT_SECRET") {
            self.auth.jwt_secret = Some(secret);
        }
        if let Ok(level) = std::env::var("RUST_LOG") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("SHOWGATE_LOG_FORMAT") {
            self.logging.format = match format.to_lowercase().as_str() {
                "json" => LogFormat::Json,
                "compact" => LogFormat::Compact,
                _ => LogFormat::Pretty,
            };
        }
    }

    /// Validate cross-references between the route, policy, and cluster tables
    ///
    /// Called once at startup; a process that fails validation never serves a
    /// request.
    pub fn validate(&self) -> Result<()> {
        if self.auth.expected_audience.trim().is_empty() {
            bail!("auth.expected_audience must not be empty");
        }

        if self.auth.jwt_secret.is_none() && self.identity_provider.discovery_url.is_none() {
            bail!(
                "No token validation keys configured: set identity_provider.discovery_url \
                 or auth.jwt_secret"
            );
        }

        if self.routes.is_empty() {
            bail!("Route table is empty; the gateway would reject every request");
        }

        for route in &self.routes {
            if !route.prefix.starts_with('/') {
                bail!("Route prefix {:?} must start with '/'", route.prefix);
            }
            if !self.clusters.contains_key(&route.cluster) {
                bail!(
                    "Route {:?} references unknown cluster {:?}",
                    route.prefix,
                    route.cluster
                );
            }
            if let Some(ref policy) = route.policy {
                if !self.policies.contains_key(policy) {
                    bail!(
                        "Route {:?} references unknown policy {:?}",
                        route.prefix,
                        policy
                    );
                }
            }
        }

        let any_exchange = self.clusters.values().any(|c| c.audience.is_some());
        for (id, cluster) in &self.clusters {
            if !cluster.base_url.starts_with("http://") && !cluster.base_url.starts_with("https://")
            {
                bail!(
                    "Cluster {:?} base_url {:?} must be an http(s) URL",
                    id,
                    cluster.base_url
                );
            }
            if let Some(ref audience) = cluster.audience {
                if audience.trim().is_empty() {
                    bail!("Cluster {:?} has an empty exchange audience", id);
                }
            }
        }

        if any_exchange {
            if self.identity_provider.client_id.trim().is_empty() {
                bail!("identity_provider.client_id is required when any cluster exchanges tokens");
            }
            if self.identity_provider.token_endpoint.is_none()
                && self.identity_provider.discovery_url.is_none()
            {
                bail!(
                    "No token endpoint configured: set identity_provider.token_endpoint \
                     or identity_provider.discovery_url"
                );
            }
        }

        Ok(())
    }
}
