use apisim_runtime::instance::RouteTable;
use apisim_runtime::mock_api::{
    ConditionOperator, ConditionType, EndpointConfig, HttpMethod, MockApiConfig,
    ScenarioCondition, ScenarioConfig,
};
use apisim_runtime::scenario::{select_scenario, MatchRequest};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use hyper::HeaderMap;
use serde_json::json;

fn condition(kind: ConditionType, key: &str, value: &str) -> ScenarioCondition {
    ScenarioCondition {
        condition_type: kind,
        key: key.to_string(),
        operator: ConditionOperator::Equals,
        value: Some(value.to_string()),
    }
}

fn scenario(id: &str, conditions: Vec<ScenarioCondition>) -> ScenarioConfig {
    ScenarioConfig {
        id: id.to_string(),
        name: id.to_string(),
        status_code: 200,
        headers: Default::default(),
        body: json!({"scenario": id}),
        conditions,
        is_default: id == "default",
    }
}

/// Endpoint with one default and two conditional scenarios
fn create_endpoint() -> EndpointConfig {
    EndpointConfig {
        id: "checkout".to_string(),
        method: HttpMethod::Post,
        path: "/checkout".to_string(),
        scenarios: vec![
            scenario(
                "header",
                vec![condition(ConditionType::Header, "x-test", "error")],
            ),
            scenario(
                "body",
                vec![
                    condition(ConditionType::Query, "region", "eu"),
                    condition(ConditionType::Body, "customer.tier", "gold"),
                ],
            ),
            scenario("default", vec![]),
        ],
        default_scenario_id: None,
    }
}

fn create_api(endpoint_count: usize) -> MockApiConfig {
    MockApiConfig {
        id: "bench".to_string(),
        name: "Bench".to_string(),
        endpoints: (0..endpoint_count)
            .map(|i| EndpointConfig {
                id: format!("ep-{i}"),
                method: HttpMethod::Get,
                path: format!("/api/v1/resource{i}/:id"),
                scenarios: vec![scenario("default", vec![])],
                default_scenario_id: None,
            })
            .collect(),
    }
}

fn bench_scenario_selection(c: &mut Criterion) {
    let mut group = c.benchmark_group("scenario_selection");
    let endpoint = create_endpoint();
    let body = r#"{"customer": {"tier": "gold", "id": 7}, "items": [1, 2, 3]}"#;

    group.throughput(Throughput::Elements(1));

    // Header condition matches first (best case)
    let mut headers = HeaderMap::new();
    headers.insert("x-test", "error".parse().unwrap());
    group.bench_function("header_match", |b| {
        b.iter(|| {
            let request = MatchRequest::new(&headers, None, None);
            select_scenario(black_box(&endpoint), black_box(&request))
        });
    });

    // Query and body conditions, body parsed once
    let empty = HeaderMap::new();
    group.bench_function("body_match", |b| {
        b.iter(|| {
            let request = MatchRequest::new(&empty, Some("region=eu"), Some(body));
            select_scenario(black_box(&endpoint), black_box(&request))
        });
    });

    // Nothing matches, falls back to the flagged default (worst case)
    group.bench_function("fallback", |b| {
        b.iter(|| {
            let request = MatchRequest::new(&empty, Some("region=us"), Some(body));
            select_scenario(black_box(&endpoint), black_box(&request))
        });
    });

    group.finish();
}

fn bench_route_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("route_lookup");

    for endpoint_count in [10, 100, 1000].iter() {
        let table = RouteTable::build(&create_api(*endpoint_count)).unwrap();
        let last = format!("/api/v1/resource{}/42", endpoint_count - 1);

        group.throughput(Throughput::Elements(1));
        group.bench_with_input(
            BenchmarkId::new("match_last", endpoint_count),
            endpoint_count,
            |b, _| {
                b.iter(|| table.resolve(black_box(HttpMethod::Get), black_box(&last)));
            },
        );

        group.bench_with_input(
            BenchmarkId::new("match_none", endpoint_count),
            endpoint_count,
            |b, _| {
                b.iter(|| table.resolve(black_box(HttpMethod::Get), black_box("/not/found")));
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_scenario_selection, bench_route_lookup);
criterion_main!(benches);
