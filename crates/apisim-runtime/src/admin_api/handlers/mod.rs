//! Admin API request handlers.

pub mod apis;
pub mod system;
