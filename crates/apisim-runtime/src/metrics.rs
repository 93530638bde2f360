//! Prometheus metrics for the apisim runtime.
//!
//! Tracks mock request traffic, instance lifecycle, health checks and port usage.
use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge, register_histogram_vec, CounterVec, Encoder, Gauge,
    HistogramVec, TextEncoder,
};

lazy_static! {
    /// Requests served by mock instances
    pub static ref MOCK_REQUESTS_TOTAL: CounterVec = register_counter_vec!(
        "apisim_mock_requests_total",
        "Total number of requests served by mock instances",
        &["api_id", "status"]
    )
    .unwrap();

    /// Time spent producing a mock response
    pub static ref MOCK_REQUEST_DURATION_MS: HistogramVec = register_histogram_vec!(
        "apisim_mock_request_duration_ms",
        "Histogram of mock request handling time in milliseconds",
        &["api_id"],
        vec![0.5, 1.0, 2.5, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0]
    )
    .unwrap();

    /// Instances currently in the running state
    pub static ref INSTANCES_RUNNING: Gauge = register_gauge!(
        "apisim_instances_running",
        "Number of mock instances currently running"
    )
    .unwrap();

    /// Instance restarts
    pub static ref INSTANCE_RESTARTS_TOTAL: CounterVec = register_counter_vec!(
        "apisim_instance_restarts_total",
        "Total number of mock instance restarts",
        &["api_id", "reason"]  // reason: operator|health_check|exited
    )
    .unwrap();

    /// Failed health checks
    pub static ref HEALTH_CHECK_FAILURES_TOTAL: CounterVec = register_counter_vec!(
        "apisim_health_check_failures_total",
        "Total number of failed instance health checks",
        &["api_id"]
    )
    .unwrap();

    /// Ports currently allocated
    pub static ref PORTS_ALLOCATED: Gauge = register_gauge!(
        "apisim_ports_allocated",
        "Number of ports currently allocated to mock APIs"
    )
    .unwrap();
}

/// Collect and return all metrics in Prometheus text format
pub fn collect_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::warn!("Failed to encode metrics: {}", e);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Helper to record a served mock request
pub fn record_mock_request(api_id: &str, status: u16, duration_ms: f64) {
    MOCK_REQUESTS_TOTAL
        .with_label_values(&[api_id, &status.to_string()])
        .inc();
    MOCK_REQUEST_DURATION_MS
        .with_label_values(&[api_id])
        .observe(duration_ms);
}

/// Helper to record an instance restart
pub fn record_restart(api_id: &str, reason: &str) {
    INSTANCE_RESTARTS_TOTAL
        .with_label_values(&[api_id, reason])
        .inc();
}

/// Helper to record a failed health check
pub fn record_health_check_failure(api_id: &str) {
    HEALTH_CHECK_FAILURES_TOTAL
        .with_label_values(&[api_id])
        .inc();
}

/// Helper to set the running instances gauge
pub fn set_instances_running(count: usize) {
    INSTANCES_RUNNING.set(count as f64);
}

/// Helper to set the allocated ports gauge
pub fn set_ports_allocated(count: usize) {
    PORTS_ALLOCATED.set(count as f64);
}
