//! Mock server instances.
//!
//! An instance serves one mock API configuration on one port. The configuration is an
//! immutable snapshot taken at launch; edits take effect on the next start.
//!
//! # Module Structure
//!
//! - `state` - Lifecycle state machine and health counters
//! - `router` - Route table compiled from endpoint paths
//! - `handler` - Request handling and response rendering
//! - `server` - Launcher trait, accept loop and server handle

mod handler;
mod router;
mod server;
mod state;

pub use handler::{handle_mock_request, MockApp, MockResponse, API_ID_HEADER};
pub use router::{RouteTable, HEALTH_PATH, INFO_PATH};
pub use server::{serve, InstanceLauncher, ServerHandle, StopOutcome, TaskLauncher};
pub use state::{InstanceSnapshot, InstanceState, MockServerInstance};

use thiserror::Error;

/// Errors raised while launching or driving an instance.
#[derive(Debug, Error)]
pub enum InstanceError {
    #[error("Failed to bind port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid route {route}: {reason}")]
    Route { route: String, reason: String },
    #[error("Invalid instance transition {from} -> {to}")]
    InvalidTransition {
        from: InstanceState,
        to: InstanceState,
    },
}
