use bytes::Bytes;
use http_body_util::Full;
use hyper::header::CONTENT_TYPE;
use hyper::http::{HeaderName, HeaderValue};
use hyper::{HeaderMap, Response, StatusCode};
use serde::Serialize;
use std::str::FromStr;
use tracing::warn;

pub const JSON_CONTENT_TYPE: &str = "application/json";

pub struct ResponseBuilder {
    status: StatusCode,
    body: Bytes,
    headers: HeaderMap,
}

impl ResponseBuilder {
    pub fn new(status_code: StatusCode) -> Self {
        ResponseBuilder {
            status: status_code,
            body: Bytes::new(),
            headers: Default::default(),
        }
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Serialize `value` as the body and default Content-Type to JSON.
    pub fn json<T: Serialize>(mut self, value: &T) -> Self {
        self.body = match serde_json::to_vec(value) {
            Ok(bytes) => Bytes::from(bytes),
            Err(e) => {
                warn!("Failed to serialize response body: {}", e);
                Bytes::from_static(b"{}")
            }
        };
        self.default_header(CONTENT_TYPE, JSON_CONTENT_TYPE)
    }

    /// Set a header, skipping names or values that are not valid HTTP.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        match (HeaderName::from_str(name), HeaderValue::from_str(value)) {
            (Ok(name), Ok(value)) => {
                self.headers.insert(name, value);
            }
            _ => warn!("Skipping invalid response header {:?}: {:?}", name, value),
        }
        self
    }

    pub fn merge_headers<'a, H>(mut self, headers: H) -> Self
    where
        H: IntoIterator<Item = (&'a String, &'a String)>,
    {
        for (key, value) in headers {
            self = self.header(key, value);
        }
        self
    }

    /// Set a header only if no value is present yet.
    pub fn default_header(mut self, name: HeaderName, value: &'static str) -> Self {
        self.headers
            .entry(name)
            .or_insert_with(|| HeaderValue::from_static(value));
        self
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn into_parts(self) -> (StatusCode, HeaderMap, Bytes) {
        (self.status, self.headers, self.body)
    }

    pub fn build(self) -> Response<Full<Bytes>> {
        let mut response = Response::new(Full::new(self.body));
        *response.status_mut() = self.status;
        response.headers_mut().extend(self.headers);
        response
    }
}

/// Build a JSON response with the given status.
pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Full<Bytes>> {
    ResponseBuilder::new(status).json(body).build()
}

/// Error body shared by the admin API: `{"errors": [{"code", "message"}]}`.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub errors: Vec<ErrorDetail>,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

/// Create an error response
pub fn error_response(status: StatusCode, code: &str, message: &str) -> Response<Full<Bytes>> {
    let error = ErrorResponse {
        errors: vec![ErrorDetail {
            code: code.to_string(),
            message: message.to_string(),
        }],
    };
    json_response(status, &error)
}

/// Create a not found response
pub fn not_found() -> Response<Full<Bytes>> {
    error_response(StatusCode::NOT_FOUND, "not_found", "Not Found")
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;
    use std::collections::HashMap;

    async fn body_string(response: Response<Full<Bytes>>) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn test_builder_with_headers() {
        let response = ResponseBuilder::new(StatusCode::CREATED)
            .header("X-Custom-Header", "test-value")
            .header("bad header", "x")
            .build();

        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(
            response.headers().get("x-custom-header"),
            Some(&HeaderValue::from_static("test-value"))
        );
        assert_eq!(response.headers().len(), 1);
    }

    #[test]
    fn test_json_keeps_explicit_content_type() {
        let mut headers = HashMap::new();
        headers.insert("Content-Type".to_string(), "application/vnd.api+json".to_string());

        let response = ResponseBuilder::new(StatusCode::OK)
            .merge_headers(&headers)
            .json(&serde_json::json!({"ok": true}))
            .build();
        assert_eq!(
            response.headers().get(CONTENT_TYPE).unwrap(),
            "application/vnd.api+json"
        );

        let response = json_response(StatusCode::OK, &serde_json::json!({"ok": true}));
        assert_eq!(response.headers().get(CONTENT_TYPE).unwrap(), JSON_CONTENT_TYPE);
    }

    #[tokio::test]
    async fn test_error_response_shape() {
        let response = error_response(StatusCode::CONFLICT, "already_running", "busy");
        assert_eq!(response.status(), StatusCode::CONFLICT);
        let body: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(body["errors"][0]["code"], "already_running");
        assert_eq!(body["errors"][0]["message"], "busy");
    }
}
