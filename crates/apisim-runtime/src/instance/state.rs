//! Lifecycle state and counters of a single mock server instance.

use super::server::ServerHandle;
use super::InstanceError;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use tracing::{debug, warn};

/// Lifecycle of an instance.
///
/// ```text
/// starting -> running -> stopping -> stopped
///     \          |           |
///      +------> error <------+
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceState {
    Starting,
    Running,
    Stopping,
    Stopped,
    Error,
}

impl InstanceState {
    pub fn can_transition_to(self, next: InstanceState) -> bool {
        use InstanceState::*;
        matches!(
            (self, next),
            (Starting, Running)
                | (Starting, Stopping)
                | (Starting, Error)
                | (Running, Stopping)
                | (Running, Error)
                | (Stopping, Stopped)
                | (Stopping, Error)
                | (Error, Stopping)
                | (Error, Stopped)
        )
    }

    /// Starting or running: the instance owns its port and may be serving.
    pub fn is_live(self) -> bool {
        matches!(self, InstanceState::Starting | InstanceState::Running)
    }
}

impl fmt::Display for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InstanceState::Starting => "starting",
            InstanceState::Running => "running",
            InstanceState::Stopping => "stopping",
            InstanceState::Stopped => "stopped",
            InstanceState::Error => "error",
        };
        f.write_str(s)
    }
}

/// Point-in-time view of an instance for callers and the admin API.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceSnapshot {
    pub api_id: String,
    pub port: u16,
    pub state: InstanceState,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_health_check: Option<DateTime<Utc>>,
    pub error_count: u32,
    pub restart_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// Runtime record of one mock API being served on one port.
///
/// Owned by the supervisor's registry. A stopped instance is never revived; the
/// next start creates a fresh one that inherits the restart counter.
pub struct MockServerInstance {
    api_id: String,
    port: u16,
    state: Mutex<InstanceState>,
    started_at: DateTime<Utc>,
    last_health_check: Mutex<Option<DateTime<Utc>>>,
    last_error: Mutex<Option<String>>,
    error_count: AtomicU32,
    consecutive_failures: AtomicU32,
    restart_count: AtomicU32,
    restart_pending: AtomicBool,
    server: Mutex<Option<ServerHandle>>,
}

impl MockServerInstance {
    pub fn new(api_id: impl Into<String>, port: u16, restart_count: u32) -> Self {
        Self {
            api_id: api_id.into(),
            port,
            state: Mutex::new(InstanceState::Starting),
            started_at: Utc::now(),
            last_health_check: Mutex::new(None),
            last_error: Mutex::new(None),
            error_count: AtomicU32::new(0),
            consecutive_failures: AtomicU32::new(0),
            restart_count: AtomicU32::new(restart_count),
            restart_pending: AtomicBool::new(false),
            server: Mutex::new(None),
        }
    }

    pub fn api_id(&self) -> &str {
        &self.api_id
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn state(&self) -> InstanceState {
        *self.state.lock()
    }

    /// Move to `next`, returning the previous state.
    pub fn transition(&self, next: InstanceState) -> Result<InstanceState, InstanceError> {
        let mut state = self.state.lock();
        let current = *state;
        if !current.can_transition_to(next) {
            warn!(
                api_id = %self.api_id,
                "Rejected instance transition {} -> {}",
                current,
                next
            );
            return Err(InstanceError::InvalidTransition {
                from: current,
                to: next,
            });
        }
        *state = next;
        debug!(api_id = %self.api_id, port = self.port, "Instance {} -> {}", current, next);
        Ok(current)
    }

    /// Record a fault and move to `error` unless already stopped or errored.
    pub fn fail(&self, reason: impl Into<String>) {
        let reason = reason.into();
        self.error_count.fetch_add(1, Ordering::SeqCst);
        {
            let mut state = self.state.lock();
            if state.can_transition_to(InstanceState::Error) {
                warn!(api_id = %self.api_id, port = self.port, "Instance {} -> error: {}", *state, reason);
                *state = InstanceState::Error;
            }
        }
        *self.last_error.lock() = Some(reason);
    }

    pub fn record_health_success(&self) {
        *self.last_health_check.lock() = Some(Utc::now());
        self.consecutive_failures.store(0, Ordering::SeqCst);
    }

    /// Count a failed health check; returns the consecutive failure count.
    pub fn record_health_failure(&self, reason: impl Into<String>) -> u32 {
        self.error_count.fetch_add(1, Ordering::SeqCst);
        *self.last_error.lock() = Some(reason.into());
        self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn error_count(&self) -> u32 {
        self.error_count.load(Ordering::SeqCst)
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::SeqCst)
    }

    pub fn restart_count(&self) -> u32 {
        self.restart_count.load(Ordering::SeqCst)
    }

    pub fn increment_restart_count(&self) -> u32 {
        self.restart_count.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Claim the right to schedule an automatic restart. Only the first caller wins.
    pub fn claim_restart(&self) -> bool {
        !self.restart_pending.swap(true, Ordering::SeqCst)
    }

    pub fn last_health_check(&self) -> Option<DateTime<Utc>> {
        *self.last_health_check.lock()
    }

    pub fn attach_server(&self, handle: ServerHandle) {
        *self.server.lock() = Some(handle);
    }

    pub fn take_server(&self) -> Option<ServerHandle> {
        self.server.lock().take()
    }

    /// True if the server task has ended on its own.
    pub fn has_exited(&self) -> bool {
        self.server
            .lock()
            .as_ref()
            .map(|handle| handle.is_finished())
            .unwrap_or(false)
    }

    pub fn snapshot(&self) -> InstanceSnapshot {
        InstanceSnapshot {
            api_id: self.api_id.clone(),
            port: self.port,
            state: self.state(),
            started_at: self.started_at,
            last_health_check: self.last_health_check(),
            error_count: self.error_count(),
            restart_count: self.restart_count(),
            last_error: self.last_error.lock().clone(),
        }
    }
}

impl fmt::Debug for MockServerInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockServerInstance")
            .field("api_id", &self.api_id)
            .field("port", &self.port)
            .field("state", &self.state())
            .finish()
    }
}
