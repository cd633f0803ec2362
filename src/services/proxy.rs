//! Proxy core
//!
//! Owns the connection pools to destination clusters and performs the actual
//! forwarding. Not part of the security logic: it receives a fully
//! transformed request and streams the destination's response back,
//! preserving status and body. Each cluster gets its own client with a
//! bounded idle lifetime so stale connections are recycled; HTTP/2 request
//! multiplexing is used where the transport allows it.

use anyhow::{Context, Result};
use axum::{
    body::Body,
    http::{HeaderMap, HeaderName, Method},
    response::Response,
};
use reqwest::Client;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::config::ClusterConfig;
use crate::utils::error::AppError;

/// Proxy error types
#[derive(Debug, Error)]
pub enum ProxyError {
    /// The destination did not answer within the cluster's timeout
    #[error("destination cluster {cluster} timed out")]
    Timeout { cluster: String },
    /// Connection-level failure reaching the destination
    #[error("failed to reach destination cluster {cluster}: {source}")]
    Unreachable {
        cluster: String,
        source: reqwest::Error,
    },
    /// Route table referenced a cluster the proxy has no client for
    #[error("unknown destination cluster {0}")]
    UnknownCluster(String),
}

impl From<ProxyError> for AppError {
    fn from(err: ProxyError) -> Self {
        match err {
            ProxyError::Timeout { cluster } => {
                AppError::GatewayTimeout(format!("Destination {cluster} timed out"))
            }
            ProxyError::Unreachable { cluster, .. } => {
                AppError::BadGateway(format!("Destination {cluster} is unreachable"))
            }
            ProxyError::UnknownCluster(cluster) => {
                AppError::Internal(format!("No client for cluster {cluster}"))
            }
        }
    }
}

/// Connection pool and base URL for one destination cluster
struct ClusterHandle {
    client: Client,
    base_url: String,
}

/// Forwarding engine holding one pooled client per destination cluster
pub struct ProxyCore {
    clusters: HashMap<String, ClusterHandle>,
}

impl ProxyCore {
    /// Build per-cluster clients from the cluster table
    pub fn new(clusters: &HashMap<String, ClusterConfig>) -> Result<Self> {
        let mut handles = HashMap::with_capacity(clusters.len());

        for (id, config) in clusters {
            let client = Client::builder()
                .timeout(Duration::from_secs(config.timeout_secs))
                .pool_idle_timeout(Duration::from_secs(config.pool_idle_timeout_secs))
                .pool_max_idle_per_host(config.pool_max_idle_per_host)
                .use_rustls_tls()
                .build()
                .with_context(|| format!("Failed to create HTTP client for cluster {id}"))?;

            handles.insert(
                id.clone(),
                ClusterHandle {
                    client,
                    base_url: config.base_url.trim_end_matches('/').to_string(),
                },
            );
        }

        Ok(Self { clusters: handles })
    }

    /// Forward a transformed request to a cluster and stream the response back
    pub async fn forward(
        &self,
        cluster: &str,
        method: Method,
        path_and_query: &str,
        headers: HeaderMap,
        body: Body,
    ) -> Result<Response, ProxyError> {
        let handle = self
            .clusters
            .get(cluster)
            .ok_or_else(|| ProxyError::UnknownCluster(cluster.to_string()))?;

        let url = format!("{}{}", handle.base_url, path_and_query);
        debug!(cluster, method = %method, url = %url, "Forwarding request");

        let upstream = handle
            .client
            .request(method, &url)
            .headers(headers)
            .body(reqwest::Body::wrap_stream(body.into_data_stream()))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProxyError::Timeout {
                        cluster: cluster.to_string(),
                    }
                } else {
                    ProxyError::Unreachable {
                        cluster: cluster.to_string(),
                        source: e,
                    }
                }
            })?;

        let status = upstream.status();
        let upstream_headers = upstream.headers().clone();

        let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
        *response.status_mut() = status;
        for (name, value) in &upstream_headers {
            if !is_hop_by_hop(name) {
                response.headers_mut().append(name.clone(), value.clone());
            }
        }

        debug!(cluster, status = %status, "Forwarded response");
        Ok(response)
    }
}

/// Connection-scoped headers that must not be forwarded in either direction
pub fn is_hop_by_hop(name: &HeaderName) -> bool {
    matches!(
        name.as_str(),
        "connection"
            | "keep-alive"
            | "proxy-authenticate"
            | "proxy-authorization"
            | "proxy-connection"
            | "te"
            | "trailer"
            | "transfer-encoding"
            | "upgrade"
            | "host"
            | "content-length"
    )
}
