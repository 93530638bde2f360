//! System handlers: health, metrics, ports, logs.

use crate::admin_api::server::AdminState;
use crate::admin_api::types::LogsQuery;
use crate::metrics::collect_metrics;
use crate::response::{json_response, ResponseBuilder};
use bytes::Bytes;
use http_body_util::Full;
use hyper::header::CONTENT_TYPE;
use hyper::{Response, StatusCode};
use serde_json::json;

/// GET /health - Admin liveness
pub fn handle_health() -> Response<Full<Bytes>> {
    json_response(
        StatusCode::OK,
        &json!({"status": "ok", "version": env!("CARGO_PKG_VERSION")}),
    )
}

/// GET /metrics - Prometheus metrics
pub fn handle_metrics() -> Response<Full<Bytes>> {
    ResponseBuilder::new(StatusCode::OK)
        .body(collect_metrics())
        .default_header(CONTENT_TYPE, "text/plain; version=0.0.4")
        .build()
}

/// GET /ports - Port allocation table
pub fn handle_ports(state: &AdminState) -> Response<Full<Bytes>> {
    let (start, end) = state.supervisor.ports().range();
    json_response(
        StatusCode::OK,
        &json!({
            "range": {"start": start, "end": end},
            "ports": state.supervisor.ports().allocations(),
        }),
    )
}

/// GET /logs - Recent request log records, newest first
pub fn handle_logs(state: &AdminState, query: Option<&str>) -> Response<Full<Bytes>> {
    let query = LogsQuery::parse(query);
    let logs = state
        .log_sink
        .recent(query.api_id.as_deref(), query.limit);
    json_response(StatusCode::OK, &json!({ "logs": logs }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_health() {
        let resp = handle_health();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[test]
    fn test_handle_metrics_content_type() {
        let resp = handle_metrics();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers()[CONTENT_TYPE],
            "text/plain; version=0.0.4"
        );
    }
}
