// Library exports for the binary, integration tests and benchmarks

// ===== Runtime core =====
pub mod instance;
pub mod mock_api;
pub mod ports;
pub mod scenario;
pub mod supervisor;

// ===== Collaborators and backends =====
pub mod backends;
pub mod repository;

// ===== Surfaces and ambient concerns =====
pub mod admin_api;
pub mod config;
pub mod metrics;
pub mod response;
