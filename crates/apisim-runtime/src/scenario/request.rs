//! Request attributes visible to scenario conditions.

use hyper::HeaderMap;
use serde_json::Value;
use std::cell::OnceCell;
use std::collections::HashMap;

/// Borrowed view of a request for condition evaluation.
///
/// The body is parsed as JSON lazily, at most once, and only if a body condition
/// asks for it. A body that is not valid JSON behaves as if every field were absent.
pub struct MatchRequest<'a> {
    headers: &'a HeaderMap,
    query: HashMap<String, String>,
    body: Option<&'a str>,
    parsed_body: OnceCell<Option<Value>>,
}

impl<'a> MatchRequest<'a> {
    pub fn new(headers: &'a HeaderMap, query: Option<&str>, body: Option<&'a str>) -> Self {
        Self {
            headers,
            query: query.map(parse_query_string).unwrap_or_default(),
            body,
            parsed_body: OnceCell::new(),
        }
    }

    /// Header value by case-insensitive name. Non-UTF-8 values count as absent.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }

    /// Body field by dotted path (`customer.tier`, `items.0.sku`).
    ///
    /// Strings are returned as-is, other scalars and containers as their JSON text.
    /// `null` counts as absent.
    pub fn body_field(&self, path: &str) -> Option<String> {
        let root = self.parsed_body().as_ref()?;
        let value = lookup_path(root, path)?;
        match value {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    fn parsed_body(&self) -> &Option<Value> {
        self.parsed_body.get_or_init(|| {
            self.body
                .filter(|b| !b.trim().is_empty())
                .and_then(|b| serde_json::from_str(b).ok())
        })
    }
}

fn lookup_path<'v>(root: &'v Value, path: &str) -> Option<&'v Value> {
    // A literal key containing dots wins over traversal
    if let Some(value) = root.as_object().and_then(|o| o.get(path)) {
        return Some(value);
    }

    path.split('.').try_fold(root, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Parse a query string into decoded key/value pairs. The first occurrence of a key wins.
pub fn parse_query_string(query: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();
    for pair in query.split('&').filter(|s| !s.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        let key = decode_component(key);
        let value = decode_component(value);
        params.entry(key).or_insert(value);
    }
    params
}

fn decode_component(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|s| s.into_owned())
        .unwrap_or(spaced)
}
