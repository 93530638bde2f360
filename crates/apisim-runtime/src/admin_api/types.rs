//! Query parsing and error mapping shared by admin handlers.

use crate::ports::PortError;
use crate::response::error_response;
use crate::scenario::parse_query_string;
use crate::supervisor::SupervisorError;
use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};

/// Default number of records returned by `GET /logs`.
pub const DEFAULT_LOG_LIMIT: usize = 100;

/// Boolean query flag. Missing or unparseable values yield `default`.
pub fn query_flag(query: Option<&str>, name: &str, default: bool) -> bool {
    query
        .map(parse_query_string)
        .and_then(|params| params.get(name).map(|v| v.to_ascii_lowercase()))
        .map(|value| match value.as_str() {
            "true" | "1" | "yes" => true,
            "false" | "0" | "no" => false,
            _ => default,
        })
        .unwrap_or(default)
}

/// `apiId` and `limit` filters for `GET /logs`.
#[derive(Debug, PartialEq, Eq)]
pub struct LogsQuery {
    pub api_id: Option<String>,
    pub limit: usize,
}

impl LogsQuery {
    pub fn parse(query: Option<&str>) -> Self {
        let params = query.map(parse_query_string).unwrap_or_default();
        Self {
            api_id: params.get("apiId").filter(|v| !v.is_empty()).cloned(),
            limit: params
                .get("limit")
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_LOG_LIMIT),
        }
    }
}

/// Map a supervisor error onto a status code and error code.
pub fn supervisor_error_response(error: &SupervisorError) -> Response<Full<Bytes>> {
    let (status, code) = match error {
        SupervisorError::AlreadyRunning(_) => (StatusCode::CONFLICT, "already_running"),
        SupervisorError::StillRunning(_) => (StatusCode::CONFLICT, "still_running"),
        SupervisorError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
        SupervisorError::Port(PortError::PortUnavailable(_)) => {
            (StatusCode::SERVICE_UNAVAILABLE, "port_unavailable")
        }
        SupervisorError::Port(PortError::NoPortsAvailable { .. }) => {
            (StatusCode::SERVICE_UNAVAILABLE, "no_ports_available")
        }
        SupervisorError::Port(PortError::AllocationNotFound(_)) => {
            (StatusCode::NOT_FOUND, "allocation_not_found")
        }
        SupervisorError::InvalidConfig { .. } => (StatusCode::UNPROCESSABLE_ENTITY, "invalid_config"),
        SupervisorError::Launch { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "launch_failed"),
        SupervisorError::StartupTimeout { .. } => {
            (StatusCode::INTERNAL_SERVER_ERROR, "startup_timeout")
        }
        SupervisorError::ExitedDuringStartup(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "exited_during_startup")
        }
        SupervisorError::Repository(_) => (StatusCode::INTERNAL_SERVER_ERROR, "repository_error"),
    };
    error_response(status, code, &error.to_string())
}
