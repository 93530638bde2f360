//! Request log sinks.

use crate::mock_api::RequestLogRecord;
use crate::repository::RequestLogSink;
use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use tracing::info;

/// Emits every record as a structured `tracing` event under `apisim::requests`.
#[derive(Debug, Default)]
pub struct TracingLogSink;

#[async_trait]
impl RequestLogSink for TracingLogSink {
    async fn record(&self, record: RequestLogRecord) -> Result<()> {
        info!(
            target: "apisim::requests",
            api_id = %record.api_id,
            endpoint_id = record.endpoint_id.as_deref().unwrap_or("-"),
            scenario_id = record.scenario_id.as_deref().unwrap_or("-"),
            status = record.response_status,
            duration_ms = record.duration_ms,
            "{} {}",
            record.method,
            record.path
        );
        Ok(())
    }
}

/// Keeps the most recent records in a bounded ring buffer.
pub struct MemoryLogSink {
    capacity: usize,
    records: Mutex<VecDeque<RequestLogRecord>>,
}

impl MemoryLogSink {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            records: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
        }
    }

    /// Newest-first records, optionally filtered to one mock API.
    pub fn recent(&self, api_id: Option<&str>, limit: usize) -> Vec<RequestLogRecord> {
        self.records
            .lock()
            .iter()
            .rev()
            .filter(|r| api_id.map_or(true, |id| r.api_id == id))
            .take(limit)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl RequestLogSink for MemoryLogSink {
    async fn record(&self, record: RequestLogRecord) -> Result<()> {
        if self.capacity == 0 {
            return Ok(());
        }
        let mut records = self.records.lock();
        while records.len() >= self.capacity {
            records.pop_front();
        }
        records.push_back(record);
        Ok(())
    }
}
