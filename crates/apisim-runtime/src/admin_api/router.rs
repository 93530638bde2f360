//! Route dispatch logic for the Admin API.

use crate::admin_api::handlers::{apis, system};
use crate::admin_api::server::AdminState;
use crate::response::not_found;
use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::{Method, Request, Response};
use std::sync::Arc;
use tracing::debug;

/// Parsed route for `/apis/:id/...`
#[derive(Debug, PartialEq, Eq)]
enum ApiRoute {
    /// GET /apis/:id
    Root,
    /// POST /apis/:id/start
    Start,
    /// POST /apis/:id/stop
    Stop,
    /// POST /apis/:id/restart
    Restart,
    /// DELETE /apis/:id/port
    Port,
}

impl ApiRoute {
    /// Parse route from path segments after `/apis/:id`
    fn parse(segments: &[&str]) -> Option<Self> {
        match segments {
            [] | [""] => Some(ApiRoute::Root),
            ["start"] => Some(ApiRoute::Start),
            ["stop"] => Some(ApiRoute::Stop),
            ["restart"] => Some(ApiRoute::Restart),
            ["port"] => Some(ApiRoute::Port),
            _ => None,
        }
    }
}

/// Hyper entry point
pub async fn route_request(
    req: Request<Incoming>,
    state: Arc<AdminState>,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let query = req.uri().query().map(|s| s.to_string());

    debug!("Admin API: {} {}", method, path);

    Ok(route(&method, &path, query.as_deref(), &state).await)
}

/// Dispatch a request. No admin route reads a request body.
pub async fn route(
    method: &Method,
    path: &str,
    query: Option<&str>,
    state: &AdminState,
) -> Response<Full<Bytes>> {
    match (method, path) {
        (&Method::GET, "/health") => return system::handle_health(),
        (&Method::GET, "/metrics") => return system::handle_metrics(),
        (&Method::GET, "/ports") => return system::handle_ports(state),
        (&Method::GET, "/logs") => return system::handle_logs(state, query),
        (&Method::GET, "/apis") | (&Method::GET, "/apis/") => return apis::handle_list(state),
        _ => {}
    }

    if let Some(rest) = path.strip_prefix("/apis/") {
        return route_api(method, rest, query, state).await;
    }

    not_found()
}

async fn route_api(
    method: &Method,
    path: &str,
    query: Option<&str>,
    state: &AdminState,
) -> Response<Full<Bytes>> {
    let segments: Vec<&str> = path.split('/').collect();
    let Some((raw_id, rest)) = segments.split_first() else {
        return not_found();
    };

    let api_id = urlencoding::decode(raw_id)
        .map(|id| id.into_owned())
        .unwrap_or_else(|_| raw_id.to_string());
    if api_id.is_empty() {
        return not_found();
    }

    let Some(route) = ApiRoute::parse(rest) else {
        return not_found();
    };

    match (method, route) {
        (&Method::GET, ApiRoute::Root) => apis::handle_get(state, &api_id),
        (&Method::POST, ApiRoute::Start) => apis::handle_start(state, &api_id, query).await,
        (&Method::POST, ApiRoute::Stop) => apis::handle_stop(state, &api_id, query).await,
        (&Method::POST, ApiRoute::Restart) => apis::handle_restart(state, &api_id).await,
        (&Method::DELETE, ApiRoute::Port) => apis::handle_release(state, &api_id).await,
        _ => not_found(),
    }
}
