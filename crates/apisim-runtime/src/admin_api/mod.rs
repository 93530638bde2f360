//! Admin REST API for the apisim runtime.
//!
//! This module provides a small JSON API for:
//! - Starting, stopping, restarting and listing mock server instances
//! - Releasing the port of a stopped mock API
//! - Inspecting the port table and recent request logs
//! - Health and Prometheus metrics endpoints
//!
//! The API listens on a configurable address (default: 127.0.0.1:2626).

mod handlers;
mod router;
mod server;
mod types;

pub use router::route;
pub use server::{AdminApiServer, AdminState};
