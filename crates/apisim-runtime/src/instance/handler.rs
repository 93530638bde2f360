//! Request handling for mock API instances.
//!
//! Each request is answered from the immutable [`MockApp`] built at launch. Built-in
//! routes are checked first, then the route table, then scenario selection.

use super::router::{RouteTable, HEALTH_PATH, INFO_PATH};
use super::InstanceError;
use crate::metrics;
use crate::mock_api::{HttpMethod, MockApiConfig, RequestLogRecord, ScenarioConfig};
use crate::repository::RequestLogSink;
use crate::response::{ResponseBuilder, JSON_CONTENT_TYPE};
use crate::scenario::{select_scenario, MatchRequest};
use bytes::Bytes;
use chrono::Utc;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::header::CONTENT_TYPE;
use hyper::{HeaderMap, Method, Request, Response, StatusCode};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Header identifying the mock API that produced a response.
pub const API_ID_HEADER: &str = "x-apisim-api";

/// Everything an instance needs to answer requests.
pub struct MockApp {
    config: Arc<MockApiConfig>,
    port: u16,
    routes: RouteTable,
    log_sink: Arc<dyn RequestLogSink>,
}

/// A computed mock response plus the ids that produced it.
#[derive(Debug)]
pub struct MockResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub endpoint_id: Option<String>,
    pub scenario_id: Option<String>,
}

impl MockApp {
    pub fn new(
        config: Arc<MockApiConfig>,
        port: u16,
        log_sink: Arc<dyn RequestLogSink>,
    ) -> Result<Self, InstanceError> {
        let routes = RouteTable::build(&config)?;
        Ok(Self {
            config,
            port,
            routes,
            log_sink,
        })
    }

    pub fn api_id(&self) -> &str {
        &self.config.id
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Answer a user request. Built-in routes are not handled here.
    pub fn respond(
        &self,
        method: &Method,
        path: &str,
        query: Option<&str>,
        headers: &HeaderMap,
        body: Option<&str>,
    ) -> MockResponse {
        let endpoint = HttpMethod::from_method(method)
            .and_then(|m| self.routes.resolve(m, path))
            .and_then(|index| self.config.endpoints.get(index));

        let Some(endpoint) = endpoint else {
            debug!(api_id = %self.config.id, "No endpoint for {} {}", method, path);
            return self.finish(
                ResponseBuilder::new(StatusCode::NOT_FOUND).json(&json!({
                    "error": "Endpoint not found",
                    "method": method.as_str(),
                    "path": path,
                    "availableEndpoints": self.routes.labels(),
                })),
                None,
                None,
            );
        };

        let request = MatchRequest::new(headers, query, body);
        let Some(selection) = select_scenario(endpoint, &request) else {
            warn!(
                api_id = %self.config.id,
                endpoint = %endpoint.route_label(),
                "Endpoint has no scenarios"
            );
            return self.finish(
                ResponseBuilder::new(StatusCode::INTERNAL_SERVER_ERROR).json(&json!({
                    "error": "No scenario configured for endpoint",
                    "endpointId": endpoint.id,
                    "method": method.as_str(),
                    "path": path,
                })),
                Some(endpoint.id.clone()),
                None,
            );
        };

        debug!(
            api_id = %self.config.id,
            endpoint = %endpoint.id,
            scenario = %selection.scenario.id,
            reason = ?selection.reason,
            "Selected scenario"
        );
        self.finish(
            scenario_response(selection.scenario),
            Some(endpoint.id.clone()),
            Some(selection.scenario.id.clone()),
        )
    }

    /// Body of `GET /health`.
    pub fn health_body(&self) -> Value {
        json!({
            "status": "ok",
            "apiId": self.config.id,
            "port": self.port,
            "timestamp": Utc::now().to_rfc3339(),
        })
    }

    /// Body of `GET /info`.
    pub fn info_body(&self) -> Value {
        let endpoints: Vec<Value> = self
            .config
            .endpoints
            .iter()
            .map(|endpoint| {
                json!({
                    "id": endpoint.id,
                    "method": endpoint.method,
                    "path": endpoint.path,
                    "scenarioCount": endpoint.scenarios.len(),
                    "defaultScenarioId": endpoint.default_scenario_id,
                })
            })
            .collect();

        json!({
            "apiId": self.config.id,
            "name": self.config.name,
            "port": self.port,
            "endpoints": endpoints,
        })
    }

    fn finish(
        &self,
        builder: ResponseBuilder,
        endpoint_id: Option<String>,
        scenario_id: Option<String>,
    ) -> MockResponse {
        let (status, headers, body) = self.tag(builder).into_parts();
        MockResponse {
            status,
            headers,
            body,
            endpoint_id,
            scenario_id,
        }
    }

    fn tag(&self, builder: ResponseBuilder) -> ResponseBuilder {
        builder.header(API_ID_HEADER, &self.config.id)
    }
}

/// Render a scenario: string bodies are sent raw, `null` as empty, anything else as JSON.
fn scenario_response(scenario: &ScenarioConfig) -> ResponseBuilder {
    let status = StatusCode::from_u16(scenario.status_code).unwrap_or_else(|_| {
        warn!(
            scenario = %scenario.id,
            "Invalid status code {}, answering 500",
            scenario.status_code
        );
        StatusCode::INTERNAL_SERVER_ERROR
    });

    let builder = ResponseBuilder::new(status).merge_headers(&scenario.headers);
    let builder = match &scenario.body {
        Value::Null => builder,
        Value::String(text) => builder.body(text.clone()),
        other => builder.json(other),
    };
    builder.default_header(CONTENT_TYPE, JSON_CONTENT_TYPE)
}

/// Handle one request to a mock instance.
pub async fn handle_mock_request(
    req: Request<Incoming>,
    app: Arc<MockApp>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let started = Instant::now();
    let (parts, body) = req.into_parts();
    let path = parts.uri.path().to_string();

    if parts.method == Method::GET && (path == HEALTH_PATH || path == INFO_PATH) {
        let body = if path == HEALTH_PATH {
            app.health_body()
        } else {
            app.info_body()
        };
        return Ok(app.tag(ResponseBuilder::new(StatusCode::OK).json(&body)).build());
    }

    let body_bytes = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            warn!(api_id = %app.api_id(), "Failed to read request body: {}", e);
            Bytes::new()
        }
    };
    let body_text = (!body_bytes.is_empty()).then(|| String::from_utf8_lossy(&body_bytes).into_owned());

    let outcome = app.respond(
        &parts.method,
        &path,
        parts.uri.query(),
        &parts.headers,
        body_text.as_deref(),
    );

    let elapsed = started.elapsed();
    metrics::record_mock_request(
        app.api_id(),
        outcome.status.as_u16(),
        elapsed.as_secs_f64() * 1000.0,
    );

    let record = RequestLogRecord {
        timestamp: Utc::now(),
        api_id: app.api_id().to_string(),
        endpoint_id: outcome.endpoint_id,
        scenario_id: outcome.scenario_id,
        method: parts.method.to_string(),
        path,
        request_headers: header_map_to_strings(&parts.headers),
        request_body: body_text,
        response_status: outcome.status.as_u16(),
        response_headers: header_map_to_strings(&outcome.headers),
        response_body: (!outcome.body.is_empty())
            .then(|| String::from_utf8_lossy(&outcome.body).into_owned()),
        duration_ms: elapsed.as_millis() as u64,
    };
    emit_log(Arc::clone(&app.log_sink), record);

    let mut response = Response::new(Full::new(outcome.body));
    *response.status_mut() = outcome.status;
    *response.headers_mut() = outcome.headers;
    Ok(response)
}

/// Hand the record to the sink without holding up the response.
fn emit_log(sink: Arc<dyn RequestLogSink>, record: RequestLogRecord) {
    tokio::spawn(async move {
        let api_id = record.api_id.clone();
        if let Err(e) = sink.record(record).await {
            warn!(api_id = %api_id, "Failed to record request log: {}", e);
        }
    });
}

fn header_map_to_strings(headers: &HeaderMap) -> HashMap<String, String> {
    let mut out = HashMap::with_capacity(headers.len());
    for (name, value) in headers {
        out.entry(name.as_str().to_string())
            .or_insert_with(|| String::from_utf8_lossy(value.as_bytes()).into_owned());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::MemoryLogSink;
    use crate::mock_api::{
        ConditionOperator, ConditionType, EndpointConfig, ScenarioCondition,
    };

    fn scenario(id: &str, status: u16, body: Value) -> ScenarioConfig {
        ScenarioConfig {
            id: id.to_string(),
            name: id.to_string(),
            status_code: status,
            headers: HashMap::new(),
            body,
            conditions: vec![],
            is_default: false,
        }
    }

    fn shop() -> Arc<MockApiConfig> {
        let mut error = scenario("err", 500, json!({"error": "boom"}));
        error.conditions = vec![ScenarioCondition {
            condition_type: ConditionType::Header,
            key: "x-test".to_string(),
            operator: ConditionOperator::Equals,
            value: Some("error".to_string()),
        }];
        let mut ok = scenario("ok", 200, json!([{"id": 1}]));
        ok.is_default = true;
        ok.headers
            .insert("X-Total-Count".to_string(), "1".to_string());

        let mut text = scenario("text", 201, json!("created"));
        text.headers
            .insert("content-type".to_string(), "text/plain".to_string());

        Arc::new(MockApiConfig {
            id: "shop".to_string(),
            name: "Shop".to_string(),
            endpoints: vec![
                EndpointConfig {
                    id: "list".to_string(),
                    method: HttpMethod::Get,
                    path: "/products".to_string(),
                    scenarios: vec![ok, error],
                    default_scenario_id: None,
                },
                EndpointConfig {
                    id: "create".to_string(),
                    method: HttpMethod::Post,
                    path: "/products".to_string(),
                    scenarios: vec![text],
                    default_scenario_id: None,
                },
                EndpointConfig {
                    id: "delete".to_string(),
                    method: HttpMethod::Delete,
                    path: "/products/:id".to_string(),
                    scenarios: vec![scenario("gone", 204, Value::Null)],
                    default_scenario_id: None,
                },
                EndpointConfig {
                    id: "empty".to_string(),
                    method: HttpMethod::Get,
                    path: "/empty".to_string(),
                    scenarios: vec![],
                    default_scenario_id: None,
                },
            ],
        })
    }

    fn app() -> MockApp {
        MockApp::new(shop(), 3005, Arc::new(MemoryLogSink::new(10))).unwrap()
    }

    fn body_json(response: &MockResponse) -> Value {
        serde_json::from_slice(&response.body).unwrap()
    }

    #[test]
    fn test_default_scenario_served() {
        let response = app().respond(&Method::GET, "/products", None, &HeaderMap::new(), None);
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(body_json(&response), json!([{"id": 1}]));
        assert_eq!(response.headers["x-total-count"], "1");
        assert_eq!(response.headers[CONTENT_TYPE], JSON_CONTENT_TYPE);
        assert_eq!(response.headers[API_ID_HEADER], "shop");
        assert_eq!(response.endpoint_id.as_deref(), Some("list"));
        assert_eq!(response.scenario_id.as_deref(), Some("ok"));
    }

    #[test]
    fn test_conditional_scenario_served() {
        let mut headers = HeaderMap::new();
        headers.insert("x-test", "error".parse().unwrap());
        let response = app().respond(&Method::GET, "/products/", None, &headers, None);
        assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(&response), json!({"error": "boom"}));
        assert_eq!(response.scenario_id.as_deref(), Some("err"));
    }

    #[test]
    fn test_string_body_sent_raw() {
        let response = app().respond(&Method::POST, "/products", None, &HeaderMap::new(), None);
        assert_eq!(response.status, StatusCode::CREATED);
        assert_eq!(&response.body[..], b"created");
        assert_eq!(response.headers[CONTENT_TYPE], "text/plain");
    }

    #[test]
    fn test_null_body_is_empty() {
        let response =
            app().respond(&Method::DELETE, "/products/7", None, &HeaderMap::new(), None);
        assert_eq!(response.status, StatusCode::NO_CONTENT);
        assert!(response.body.is_empty());
    }

    #[test]
    fn test_unknown_route_lists_endpoints() {
        let response = app().respond(&Method::GET, "/orders", None, &HeaderMap::new(), None);
        assert_eq!(response.status, StatusCode::NOT_FOUND);
        let body = body_json(&response);
        assert_eq!(body["error"], "Endpoint not found");
        assert_eq!(body["method"], "GET");
        assert_eq!(body["path"], "/orders");
        assert_eq!(body["availableEndpoints"][0], "GET /products");
        assert_eq!(body["availableEndpoints"].as_array().unwrap().len(), 4);
        assert!(response.endpoint_id.is_none());
    }

    #[test]
    fn test_unsupported_method_is_not_found() {
        let response = app().respond(&Method::TRACE, "/products", None, &HeaderMap::new(), None);
        assert_eq!(response.status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_endpoint_without_scenarios() {
        let response = app().respond(&Method::GET, "/empty", None, &HeaderMap::new(), None);
        assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(&response);
        assert_eq!(body["endpointId"], "empty");
        assert_eq!(response.endpoint_id.as_deref(), Some("empty"));
        assert!(response.scenario_id.is_none());
    }

    #[test]
    fn test_health_and_info_bodies() {
        let app = app();
        let health = app.health_body();
        assert_eq!(health["status"], "ok");
        assert_eq!(health["apiId"], "shop");
        assert_eq!(health["port"], 3005);

        let info = app.info_body();
        assert_eq!(info["name"], "Shop");
        assert_eq!(info["endpoints"][0]["scenarioCount"], 2);
        assert_eq!(info["endpoints"][2]["path"], "/products/:id");
    }

    #[test]
    fn test_header_map_to_strings_keeps_first_value() {
        let mut headers = HeaderMap::new();
        headers.append("x-multi", "a".parse().unwrap());
        headers.append("x-multi", "b".parse().unwrap());
        let map = header_map_to_strings(&headers);
        assert_eq!(map["x-multi"], "a");
    }
}
