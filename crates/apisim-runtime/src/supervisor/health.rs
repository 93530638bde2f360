//! Instance health probing.

use anyhow::{bail, Context};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

/// Checks whether the instance on `port` answers its health route.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn check(&self, port: u16) -> anyhow::Result<()>;
}

/// Result of one monitoring pass over an instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthOutcome {
    Healthy,
    Unhealthy(String),
    /// The server task ended without being asked to
    Exited,
}

#[derive(Deserialize)]
struct HealthBody {
    status: String,
}

/// Probes `GET http://{host}:{port}/health` and expects `{"status": "ok"}`.
pub struct HttpHealthProbe {
    client: reqwest::Client,
    host: String,
}

impl HttpHealthProbe {
    pub fn new(host: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .no_proxy()
            .build()?;
        Ok(Self {
            client,
            host: host.into(),
        })
    }
}

#[async_trait]
impl HealthProbe for HttpHealthProbe {
    async fn check(&self, port: u16) -> anyhow::Result<()> {
        let url = format!("http://{}:{}/health", self.host, port);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("GET {url}"))?;

        if !response.status().is_success() {
            bail!("GET {} returned {}", url, response.status());
        }

        let body: HealthBody = response
            .json()
            .await
            .with_context(|| format!("GET {url} returned an unreadable body"))?;
        if body.status != "ok" {
            bail!("GET {} reported status {:?}", url, body.status);
        }
        Ok(())
    }
}
