//! Mock API definitions served by a running instance.
//!
//! This module provides:
//! - `MockApiConfig`: the immutable snapshot handed to an instance at spawn time
//! - `EndpointConfig` / `ScenarioConfig` / `ScenarioCondition`: routing and response data
//! - `RequestLogRecord`: the record emitted for every request an instance handles
//!
//! ## Module Structure
//!
//! - `types`: All type definitions and configuration validation

mod types;


pub use types::{
    ConditionOperator, ConditionType, ConfigError, EndpointConfig, HttpMethod, MockApiConfig,
    MockApiDefinition, MockApiStatus, RequestLogRecord, ScenarioCondition, ScenarioConfig,
    MAX_SCENARIOS_PER_ENDPOINT,
};

pub(crate) use types::normalize_path;
