//! Collaborator interfaces consumed by the runtime.
//!
//! The runtime never talks to storage directly. Mock API records come from a
//! [`MockApiRepository`] and request log records go to a [`RequestLogSink`].
//! Backends live in `crate::backends`.

use crate::mock_api::{MockApiConfig, MockApiStatus, RequestLogRecord};
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Persistence collaborator for mock API records.
#[async_trait]
pub trait MockApiRepository: Send + Sync {
    /// Load a mock API together with all its endpoints and scenarios.
    async fn find_mock_api_with_endpoints_and_scenarios(
        &self,
        id: &str,
    ) -> Result<Option<MockApiConfig>>;

    /// Persist the activation flag.
    async fn set_status(&self, id: &str, status: MockApiStatus) -> Result<()>;

    /// Ids of every mock API whose persisted status is active.
    async fn list_active_mock_apis(&self) -> Result<Vec<String>>;

    /// Port recorded against a mock API, if any.
    async fn find_port_assignment(&self, id: &str) -> Result<Option<u16>>;

    /// Every recorded (id, port) pair, used to seed the port allocator at boot.
    async fn list_port_assignments(&self) -> Result<Vec<(String, u16)>>;

    /// Record the port a mock API was assigned.
    async fn save_port_assignment(&self, id: &str, port: u16) -> Result<()>;
}

/// Destination for request log records.
///
/// Called off the response path; failures are reported and dropped.
#[async_trait]
pub trait RequestLogSink: Send + Sync {
    async fn record(&self, record: RequestLogRecord) -> Result<()>;
}

/// Sink that discards everything.
#[derive(Debug, Default)]
pub struct NoOpLogSink;

#[async_trait]
impl RequestLogSink for NoOpLogSink {
    async fn record(&self, _record: RequestLogRecord) -> Result<()> {
        Ok(())
    }
}

/// Forwards each record to several sinks. Every sink is tried; the first error is returned.
pub struct FanoutLogSink {
    sinks: Vec<Arc<dyn RequestLogSink>>,
}

impl FanoutLogSink {
    pub fn new(sinks: Vec<Arc<dyn RequestLogSink>>) -> Self {
        Self { sinks }
    }
}

#[async_trait]
impl RequestLogSink for FanoutLogSink {
    async fn record(&self, record: RequestLogRecord) -> Result<()> {
        let mut first_error = None;
        for sink in &self.sinks {
            if let Err(e) = sink.record(record.clone()).await {
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
