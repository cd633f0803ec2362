//! Route table
//!
//! Maps inbound request paths to destination clusters and policy names using
//! explicit, ordered, most-specific-prefix matching on path-segment
//! boundaries. Built once from configuration at startup and immutable for the
//! process lifetime.

use crate::config::RouteConfig;

/// A matched route entry
#[derive(Debug, Clone)]
pub struct Route {
    pub prefix: String,
    pub cluster: String,
    pub policy: Option<String>,
}

/// Static route table, ordered longest-prefix-first
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    pub fn new(config: &[RouteConfig]) -> Self {
        let mut routes: Vec<Route> = config
            .iter()
            .map(|r| Route {
                prefix: r.prefix.trim_end_matches('/').to_string(),
                cluster: r.cluster.clone(),
                policy: r.policy.clone(),
            })
            .collect();

        // Longest prefix wins; declaration order breaks ties.
        routes.sort_by(|a, b| b.prefix.len().cmp(&a.prefix.len()));

        Self { routes }
    }

    /// Resolve a request path to its route, most specific prefix first
    pub fn resolve(&self, path: &str) -> Option<&Route> {
        self.routes
            .iter()
            .find(|route| prefix_matches(&route.prefix, path))
    }
}

/// Prefix match on path-segment boundaries
///
/// `/api/comp` must not match `/api/competitions`.
fn prefix_matches(prefix: &str, path: &str) -> bool {
    if prefix.is_empty() {
        return true;
    }
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}
