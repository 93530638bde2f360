//! Error and report types for the supervisor.

use crate::instance::InstanceError;
use crate::mock_api::ConfigError;
use crate::ports::PortError;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("Mock API {0} is already running")]
    AlreadyRunning(String),
    #[error("Mock API {0} not found")]
    NotFound(String),
    #[error("Mock API {0} is still running")]
    StillRunning(String),
    #[error(transparent)]
    Port(#[from] PortError),
    #[error("Invalid configuration for mock API {api_id}: {source}")]
    InvalidConfig {
        api_id: String,
        #[source]
        source: ConfigError,
    },
    #[error("Failed to launch mock API {api_id}: {source}")]
    Launch {
        api_id: String,
        #[source]
        source: InstanceError,
    },
    #[error("Mock API {api_id} did not become healthy within {timeout_ms}ms")]
    StartupTimeout { api_id: String, timeout_ms: u64 },
    #[error("Mock API {0} exited during startup")]
    ExitedDuringStartup(String),
    #[error("Repository error: {0:#}")]
    Repository(anyhow::Error),
}

impl From<anyhow::Error> for SupervisorError {
    fn from(e: anyhow::Error) -> Self {
        SupervisorError::Repository(e)
    }
}

/// Why an instance was restarted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartReason {
    Operator,
    HealthCheck,
    Exited,
}

impl RestartReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RestartReason::Operator => "operator",
            RestartReason::HealthCheck => "health_check",
            RestartReason::Exited => "exited",
        }
    }

    pub fn is_automatic(&self) -> bool {
        !matches!(self, RestartReason::Operator)
    }
}

/// Outcome of restoring persisted-active mock APIs at boot.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreReport {
    pub restored: Vec<String>,
    pub failed: Vec<RestoreFailure>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreFailure {
    pub api_id: String,
    pub error: String,
}
