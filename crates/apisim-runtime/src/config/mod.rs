//! Configuration types for the apisim runtime.

mod listen;
mod supervisor;

use std::path::Path;

use serde::{Deserialize, Serialize};

pub use listen::{AdminConfig, InstancesConfig, RequestLogConfig};
pub use supervisor::{PortsConfig, SupervisorConfig};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub ports: PortsConfig,
    #[serde(default)]
    pub supervisor: SupervisorConfig,
    #[serde(default)]
    pub admin: AdminConfig,
    #[serde(default)]
    pub instances: InstancesConfig,
    #[serde(default)]
    pub request_log: RequestLogConfig,
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, anyhow::Error> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.ports.range_start > self.ports.range_end {
            anyhow::bail!(
                "Invalid port range {}-{}: range_start must not exceed range_end",
                self.ports.range_start,
                self.ports.range_end
            );
        }

        if self.ports.range_end < crate::ports::MIN_ELIGIBLE_PORT {
            anyhow::bail!(
                "Invalid port range {}-{}: ports below {} are never eligible",
                self.ports.range_start,
                self.ports.range_end,
                crate::ports::MIN_ELIGIBLE_PORT
            );
        }

        let admin_port = self.admin.port;
        if admin_port >= self.ports.range_start
            && admin_port <= self.ports.range_end
            && !self.ports.reserved.contains(&admin_port)
        {
            anyhow::bail!(
                "Admin port {} lies inside the mock port range {}-{}; move it or add it to ports.reserved",
                admin_port,
                self.ports.range_start,
                self.ports.range_end
            );
        }

        if self.supervisor.failure_threshold == 0 {
            anyhow::bail!("supervisor.failure_threshold must be at least 1");
        }

        if self.supervisor.health_check_interval_ms == 0 {
            anyhow::bail!("supervisor.health_check_interval_ms must be greater than 0");
        }

        if self.supervisor.health_check_timeout_ms == 0 {
            anyhow::bail!("supervisor.health_check_timeout_ms must be greater than 0");
        }

        if self.supervisor.startup_timeout_ms == 0 {
            anyhow::bail!("supervisor.startup_timeout_ms must be greater than 0");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: Config = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config.ports.range_start, 3001);
        assert_eq!(config.ports.range_end, 9999);
        assert_eq!(config.ports.reserved, vec![5000]);
        assert_eq!(config.supervisor.startup_timeout(), Duration::from_secs(10));
        assert_eq!(config.supervisor.stop_grace(), Duration::from_secs(5));
        assert_eq!(
            config.supervisor.health_check_interval(),
            Duration::from_secs(30)
        );
        assert_eq!(config.supervisor.health_check_timeout(), Duration::from_secs(5));
        assert_eq!(config.supervisor.failure_threshold, 3);
        assert_eq!(config.supervisor.max_consecutive_restarts, 3);
        assert_eq!(config.admin.port, 2626);
        assert_eq!(config.instances.bind_host, "0.0.0.0");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_config() {
        let yaml = r#"
ports:
  range_start: 4000
  range_end: 4100
  reserved: [4050, 4051]
supervisor:
  startup_timeout_ms: 2000
  health_check_interval_ms: 1000
  restart_backoff_ms: 0
admin:
  host: 0.0.0.0
  port: 9000
request_log:
  retain: 50
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.ports.range_start, 4000);
        assert_eq!(config.ports.reserved, vec![4050, 4051]);
        assert_eq!(config.supervisor.startup_timeout_ms, 2000);
        // Unset fields keep their defaults
        assert_eq!(config.supervisor.stop_grace_ms, 5000);
        assert_eq!(config.admin.host, "0.0.0.0");
        assert_eq!(config.request_log.retain, 50);
        assert!(config.request_log.trace);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_inverted_range() {
        let mut config = Config::default();
        config.ports.range_start = 9000;
        config.ports.range_end = 8000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_admin_port_in_range() {
        let mut config = Config::default();
        config.admin.port = 4000;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Admin port 4000"));

        config.ports.reserved.push(4000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_health_check_timeout() {
        let mut config = Config::default();
        config.supervisor.health_check_timeout_ms = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("health_check_timeout_ms"));
    }

    #[test]
    fn test_restart_backoff_doubles() {
        let config = SupervisorConfig {
            restart_backoff_ms: 100,
            ..Default::default()
        };
        assert_eq!(config.restart_backoff(0), Duration::ZERO);
        assert_eq!(config.restart_backoff(1), Duration::from_millis(100));
        assert_eq!(config.restart_backoff(2), Duration::from_millis(200));
        assert_eq!(config.restart_backoff(3), Duration::from_millis(400));

        let disabled = SupervisorConfig {
            restart_backoff_ms: 0,
            ..Default::default()
        };
        assert_eq!(disabled.restart_backoff(3), Duration::ZERO);
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("apisim.yaml");
        std::fs::write(&path, "ports:\n  range_start: 7000\n  range_end: 7010\n").unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.ports.range_start, 7000);

        std::fs::write(&path, "ports:\n  range_start: 7010\n  range_end: 7000\n").unwrap();
        assert!(Config::from_file(&path).is_err());
    }
}
