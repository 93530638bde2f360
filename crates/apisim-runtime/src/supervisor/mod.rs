//! Mock server supervisor.
//!
//! Starts, stops and restarts mock server instances on behalf of callers, keeps the
//! port allocator and persisted status in step with what is actually serving, and
//! watches running instances with periodic health checks.
//!
//! # Module Structure
//!
//! - `manager` - The `Supervisor` and its lifecycle operations
//! - `health` - Health probe trait and HTTP implementation
//! - `types` - Errors and reports

mod health;
mod manager;
mod types;


pub use health::{HealthOutcome, HealthProbe, HttpHealthProbe};
pub use manager::Supervisor;
pub use types::{RestartReason, RestoreFailure, RestoreReport, SupervisorError};
