//! Port range and supervisor timing configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PortsConfig {
    #[serde(default = "default_range_start")]
    pub range_start: u16,
    #[serde(default = "default_range_end")]
    pub range_end: u16,
    /// Ports never handed out even though they fall inside the range
    #[serde(default = "default_reserved")]
    pub reserved: Vec<u16>,
}

fn default_range_start() -> u16 {
    3001
}

fn default_range_end() -> u16 {
    9999
}

fn default_reserved() -> Vec<u16> {
    // Commonly taken by platform services (AirPlay receiver on macOS, Flask dev servers)
    vec![5000]
}

impl Default for PortsConfig {
    fn default() -> Self {
        Self {
            range_start: default_range_start(),
            range_end: default_range_end(),
            reserved: default_reserved(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SupervisorConfig {
    /// How long a starting instance has to answer its health endpoint
    #[serde(default = "default_startup_timeout")]
    pub startup_timeout_ms: u64,
    #[serde(default = "default_startup_poll_interval")]
    pub startup_poll_interval_ms: u64,
    /// How long a graceful stop waits for in-flight connections before aborting
    #[serde(default = "default_stop_grace")]
    pub stop_grace_ms: u64,
    #[serde(default = "default_health_interval")]
    pub health_check_interval_ms: u64,
    #[serde(default = "default_health_timeout")]
    pub health_check_timeout_ms: u64,
    /// Consecutive failed health checks before a running instance is marked errored
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    #[serde(default = "default_max_restarts")]
    pub max_consecutive_restarts: u32,
    /// Base delay for exponential backoff between automatic restarts (0 disables)
    #[serde(default = "default_restart_backoff")]
    pub restart_backoff_ms: u64,
}

fn default_startup_timeout() -> u64 {
    10_000
}

fn default_startup_poll_interval() -> u64 {
    100
}

fn default_stop_grace() -> u64 {
    5_000
}

fn default_health_interval() -> u64 {
    30_000
}

fn default_health_timeout() -> u64 {
    5_000
}

fn default_failure_threshold() -> u32 {
    3
}

fn default_max_restarts() -> u32 {
    3
}

fn default_restart_backoff() -> u64 {
    500
}

impl SupervisorConfig {
    pub fn startup_timeout(&self) -> Duration {
        Duration::from_millis(self.startup_timeout_ms)
    }

    pub fn startup_poll_interval(&self) -> Duration {
        Duration::from_millis(self.startup_poll_interval_ms.max(1))
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }

    pub fn health_check_interval(&self) -> Duration {
        Duration::from_millis(self.health_check_interval_ms.max(1))
    }

    pub fn health_check_timeout(&self) -> Duration {
        Duration::from_millis(self.health_check_timeout_ms)
    }

    /// Delay before the `attempt`-th consecutive automatic restart (1-based).
    pub fn restart_backoff(&self, attempt: u32) -> Duration {
        if self.restart_backoff_ms == 0 || attempt == 0 {
            return Duration::ZERO;
        }
        let factor = 1u64 << (attempt - 1).min(16);
        Duration::from_millis(self.restart_backoff_ms.saturating_mul(factor))
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            startup_timeout_ms: default_startup_timeout(),
            startup_poll_interval_ms: default_startup_poll_interval(),
            stop_grace_ms: default_stop_grace(),
            health_check_interval_ms: default_health_interval(),
            health_check_timeout_ms: default_health_timeout(),
            failure_threshold: default_failure_threshold(),
            max_consecutive_restarts: default_max_restarts(),
            restart_backoff_ms: default_restart_backoff(),
        }
    }
}
