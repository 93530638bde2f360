//! Listen configuration for the admin API and mock instances.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AdminConfig {
    #[serde(default = "default_admin_host")]
    pub host: String,
    #[serde(default = "default_admin_port")]
    pub port: u16,
}

fn default_admin_host() -> String {
    "127.0.0.1".to_string()
}

fn default_admin_port() -> u16 {
    2626
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            host: default_admin_host(),
            port: default_admin_port(),
        }
    }
}

impl AdminConfig {
    /// Resolves `host` (IP literal or name) to the address the admin API binds.
    pub async fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        tokio::net::lookup_host((self.host.as_str(), self.port))
            .await
            .with_context(|| format!("Failed to resolve admin host {}", self.host))?
            .next()
            .with_context(|| format!("Admin host {} resolved to no addresses", self.host))
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InstancesConfig {
    /// Address every mock instance binds on
    #[serde(default = "default_bind_host")]
    pub bind_host: String,
    /// Host the supervisor uses to reach instance health endpoints
    #[serde(default = "default_probe_host")]
    pub probe_host: String,
}

fn default_bind_host() -> String {
    "0.0.0.0".to_string()
}

fn default_probe_host() -> String {
    "127.0.0.1".to_string()
}

impl Default for InstancesConfig {
    fn default() -> Self {
        Self {
            bind_host: default_bind_host(),
            probe_host: default_probe_host(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RequestLogConfig {
    /// Number of recent request records kept in memory for the admin API
    #[serde(default = "default_retain")]
    pub retain: usize,
    /// Also emit every record through tracing
    #[serde(default = "default_trace")]
    pub trace: bool,
}

fn default_retain() -> usize {
    1000
}

fn default_trace() -> bool {
    true
}

impl Default for RequestLogConfig {
    fn default() -> Self {
        Self {
            retain: default_retain(),
            trace: default_trace(),
        }
    }
}
