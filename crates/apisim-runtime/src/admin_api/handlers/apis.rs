//! Mock API lifecycle handlers.

use crate::admin_api::server::AdminState;
use crate::admin_api::types::{query_flag, supervisor_error_response};
use crate::response::{error_response, json_response};
use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde_json::json;
use tracing::info;

/// GET /apis - List instance snapshots
pub fn handle_list(state: &AdminState) -> Response<Full<Bytes>> {
    json_response(StatusCode::OK, &json!({ "apis": state.supervisor.list() }))
}

/// GET /apis/:id - One instance snapshot
pub fn handle_get(state: &AdminState, api_id: &str) -> Response<Full<Bytes>> {
    match state.supervisor.status(api_id) {
        Some(snapshot) => json_response(StatusCode::OK, &snapshot),
        None => error_response(
            StatusCode::NOT_FOUND,
            "not_found",
            &format!("No instance for mock API {api_id}"),
        ),
    }
}

/// POST /apis/:id/start[?force=true]
pub async fn handle_start(
    state: &AdminState,
    api_id: &str,
    query: Option<&str>,
) -> Response<Full<Bytes>> {
    let force = query_flag(query, "force", false);
    match state.supervisor.start(api_id, force).await {
        Ok(snapshot) => {
            info!(api_id, port = snapshot.port, "Started mock API via admin API");
            json_response(StatusCode::OK, &snapshot)
        }
        Err(e) => supervisor_error_response(&e),
    }
}

/// POST /apis/:id/stop[?graceful=false]
pub async fn handle_stop(
    state: &AdminState,
    api_id: &str,
    query: Option<&str>,
) -> Response<Full<Bytes>> {
    let graceful = query_flag(query, "graceful", true);
    match state.supervisor.stop(api_id, graceful).await {
        Ok(()) => match state.supervisor.status(api_id) {
            Some(snapshot) => json_response(StatusCode::OK, &snapshot),
            None => json_response(StatusCode::OK, &json!({"apiId": api_id, "state": "stopped"})),
        },
        Err(e) => supervisor_error_response(&e),
    }
}

/// POST /apis/:id/restart
pub async fn handle_restart(state: &AdminState, api_id: &str) -> Response<Full<Bytes>> {
    match state.supervisor.restart(api_id).await {
        Ok(snapshot) => json_response(StatusCode::OK, &snapshot),
        Err(e) => supervisor_error_response(&e),
    }
}

/// DELETE /apis/:id/port - Release the port of a stopped mock API
pub async fn handle_release(state: &AdminState, api_id: &str) -> Response<Full<Bytes>> {
    match state.supervisor.release(api_id).await {
        Ok(()) => json_response(StatusCode::OK, &json!({"apiId": api_id, "released": true})),
        Err(e) => supervisor_error_response(&e),
    }
}
