//! Type definitions for mock API configuration.
//!
//! This module contains the structs and enums that describe a mock API, as served by
//! an instance, plus the request log record it emits.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use tracing::warn;

/// Maximum number of response scenarios an endpoint may hold.
pub const MAX_SCENARIOS_PER_ENDPOINT: usize = 3;

// ============================================================================
// Configuration Types
// ============================================================================

/// HTTP methods an endpoint can be registered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[serde(alias = "get")]
    Get,
    #[serde(alias = "post")]
    Post,
    #[serde(alias = "put")]
    Put,
    #[serde(alias = "delete")]
    Delete,
    #[serde(alias = "patch")]
    Patch,
    #[serde(alias = "head")]
    Head,
    #[serde(alias = "options")]
    Options,
}

impl HttpMethod {
    pub const ALL: [HttpMethod; 7] = [
        HttpMethod::Get,
        HttpMethod::Post,
        HttpMethod::Put,
        HttpMethod::Delete,
        HttpMethod::Patch,
        HttpMethod::Head,
        HttpMethod::Options,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Head => "HEAD",
            HttpMethod::Options => "OPTIONS",
        }
    }

    /// Map a hyper method onto the supported set. Methods outside it (TRACE, CONNECT,
    /// extensions) never route to a user endpoint.
    pub fn from_method(method: &hyper::Method) -> Option<Self> {
        method.as_str().parse().ok()
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        HttpMethod::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unsupported HTTP method: {s}"))
    }
}

/// Which request attribute a condition inspects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConditionType {
    Header,
    Query,
    Body,
}

/// How a condition compares the looked-up attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConditionOperator {
    /// Attribute is present and non-empty
    Exists,
    /// Exact string match
    Equals,
    /// Substring match
    Contains,
}

/// A predicate over one request attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioCondition {
    #[serde(rename = "type")]
    pub condition_type: ConditionType,
    pub key: String,
    pub operator: ConditionOperator,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

fn default_status_code() -> u16 {
    200
}

/// One canned response an endpoint can return.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioConfig {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_status_code")]
    pub status_code: u16,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub body: serde_json::Value,
    /// AND-combined; an empty list means the scenario is only reachable as a fallback
    #[serde(default)]
    pub conditions: Vec<ScenarioCondition>,
    #[serde(default)]
    pub is_default: bool,
}

/// A (method, path) route within a mock API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointConfig {
    pub id: String,
    pub method: HttpMethod,
    /// Literal path or route pattern (`/users/:id`, `/files/*`)
    pub path: String,
    #[serde(default)]
    pub scenarios: Vec<ScenarioConfig>,
    /// Overrides the `is_default` flag when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_scenario_id: Option<String>,
}

impl EndpointConfig {
    /// `METHOD /path` label used in route listings and logs.
    pub fn route_label(&self) -> String {
        format!("{} {}", self.method, self.path)
    }
}

/// Immutable configuration snapshot for one mock API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MockApiConfig {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub endpoints: Vec<EndpointConfig>,
}

/// Reasons a mock API configuration cannot be served.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Duplicate route {method} {path}")]
    DuplicateRoute { method: HttpMethod, path: String },
    #[error("Endpoint {endpoint} has {count} scenarios (max {MAX_SCENARIOS_PER_ENDPOINT})")]
    TooManyScenarios { endpoint: String, count: usize },
    #[error("Scenario {scenario} has invalid status code {status}")]
    InvalidStatusCode { scenario: String, status: u16 },
    #[error("Endpoint {0} has an invalid path (must start with '/')")]
    InvalidPath(String),
}

impl MockApiConfig {
    /// Check the invariants an instance relies on.
    ///
    /// Multiple `is_default` scenarios are tolerated with a warning: selection takes
    /// the first flagged one.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut routes = HashSet::new();

        for endpoint in &self.endpoints {
            if !endpoint.path.starts_with('/') {
                return Err(ConfigError::InvalidPath(endpoint.id.clone()));
            }

            if !routes.insert((endpoint.method, normalize_path(&endpoint.path))) {
                return Err(ConfigError::DuplicateRoute {
                    method: endpoint.method,
                    path: endpoint.path.clone(),
                });
            }

            if endpoint.scenarios.len() > MAX_SCENARIOS_PER_ENDPOINT {
                return Err(ConfigError::TooManyScenarios {
                    endpoint: endpoint.id.clone(),
                    count: endpoint.scenarios.len(),
                });
            }

            for scenario in &endpoint.scenarios {
                if !(100..=599).contains(&scenario.status_code) {
                    return Err(ConfigError::InvalidStatusCode {
                        scenario: scenario.id.clone(),
                        status: scenario.status_code,
                    });
                }
            }

            let defaults = endpoint.scenarios.iter().filter(|s| s.is_default).count();
            if defaults > 1 {
                warn!(
                    api_id = %self.id,
                    endpoint = %endpoint.route_label(),
                    "{} scenarios flagged as default; the first one wins",
                    defaults
                );
            }
        }

        Ok(())
    }
}

/// Strip a trailing slash so `/products/` and `/products` are the same route.
pub(crate) fn normalize_path(path: &str) -> &str {
    if path.len() > 1 {
        path.strip_suffix('/').unwrap_or(path)
    } else {
        path
    }
}

// ============================================================================
// Persisted Records
// ============================================================================

/// Persisted activation flag of a mock API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MockApiStatus {
    Active,
    #[default]
    Inactive,
}

impl fmt::Display for MockApiStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MockApiStatus::Active => f.write_str("active"),
            MockApiStatus::Inactive => f.write_str("inactive"),
        }
    }
}

/// A stored mock API: its configuration plus activation state and port assignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MockApiDefinition {
    #[serde(flatten)]
    pub config: MockApiConfig,
    #[serde(default)]
    pub status: MockApiStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

// ============================================================================
// Request Log
// ============================================================================

/// One handled (or unmatched) request, as emitted to the log sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestLogRecord {
    pub timestamp: DateTime<Utc>,
    pub api_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scenario_id: Option<String>,
    pub method: String,
    pub path: String,
    pub request_headers: HashMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_body: Option<String>,
    pub response_status: u16,
    pub response_headers: HashMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_body: Option<String>,
    pub duration_ms: u64,
}
