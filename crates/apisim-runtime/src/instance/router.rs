//! Route table for one mock API instance.
//!
//! Endpoint paths use `:param` segments and a trailing `*` wildcard. They are compiled
//! into one `matchit` router per method; lookups strip a trailing slash first.

use super::InstanceError;
use crate::mock_api::{normalize_path, HttpMethod, MockApiConfig};
use std::collections::HashMap;
use tracing::warn;

/// Paths every instance answers itself on GET.
pub const HEALTH_PATH: &str = "/health";
pub const INFO_PATH: &str = "/info";

/// Per-method route lookup resolving to an endpoint index.
#[derive(Default)]
pub struct RouteTable {
    by_method: HashMap<HttpMethod, matchit::Router<usize>>,
    labels: Vec<String>,
}

impl RouteTable {
    /// Compile the endpoints of `config`.
    ///
    /// Fails if two endpoints collide after pattern conversion.
    pub fn build(config: &MockApiConfig) -> Result<Self, InstanceError> {
        let mut table = RouteTable::default();

        for (index, endpoint) in config.endpoints.iter().enumerate() {
            let path = normalize_path(&endpoint.path);
            if endpoint.method == HttpMethod::Get && is_reserved_path(path) {
                warn!(
                    api_id = %config.id,
                    endpoint = %endpoint.route_label(),
                    "Endpoint is shadowed by the built-in {} route",
                    path
                );
            }

            let pattern = to_route_pattern(path);
            table
                .by_method
                .entry(endpoint.method)
                .or_insert_with(matchit::Router::new)
                .insert(pattern, index)
                .map_err(|e| InstanceError::Route {
                    route: format!("{} {}", endpoint.method, endpoint.path),
                    reason: e.to_string(),
                })?;
            table.labels.push(endpoint.route_label());
        }

        Ok(table)
    }

    /// Index of the endpoint serving `method path`.
    ///
    /// HEAD falls back to the GET route when no HEAD endpoint matches.
    pub fn resolve(&self, method: HttpMethod, path: &str) -> Option<usize> {
        let path = normalize_path(path);
        let lookup = |method: HttpMethod| {
            self.by_method
                .get(&method)
                .and_then(|router| router.at(path).ok())
                .map(|matched| *matched.value)
        };

        lookup(method).or_else(|| {
            if method == HttpMethod::Head {
                lookup(HttpMethod::Get)
            } else {
                None
            }
        })
    }

    /// `METHOD /path` labels in declaration order.
    pub fn labels(&self) -> &[String] {
        &self.labels
    }
}

pub fn is_reserved_path(path: &str) -> bool {
    path == HEALTH_PATH || path == INFO_PATH
}

/// Convert `/users/:id/files/*` into `/users/{id}/files/{*wildcard}`.
fn to_route_pattern(path: &str) -> String {
    let segments: Vec<&str> = path.split('/').collect();
    let last = segments.len().saturating_sub(1);

    segments
        .iter()
        .enumerate()
        .map(|(i, segment)| {
            if let Some(name) = segment.strip_prefix(':').filter(|n| !n.is_empty()) {
                format!("{{{name}}}")
            } else if *segment == "*" && i == last {
                "{*wildcard}".to_string()
            } else {
                segment.replace('{', "{{").replace('}', "}}")
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}
