//! Configuration schema of the relay server.
//!
//! All types derive Serde traits for deserialization from TOML files, and
//! every section has defaults so a minimal file (or none) is valid.

use serde::{Deserialize, Serialize};

use crate::proxy::ProxySettings;

/// Root configuration of the relay server.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServerConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Relay route, allow-list and credential override.
    pub proxy: ProxySettings,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:3000").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3000".to_string(),
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Upstream connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Total time allowed for one upstream call in seconds.
    pub upstream_secs: u64,

    /// Total time allowed for one inbound request in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            upstream_secs: 60,
            request_secs: 90,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit logs as JSON lines.
    pub json_logs: bool,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_file_uses_defaults() {
        let config: ServerConfig = toml::from_str(
            r#"
            [proxy]
            allowed_domains = ["modelrunner.run"]
            "#,
        )
        .unwrap();
        assert_eq!(config.listener.bind_address, "0.0.0.0:3000");
        assert_eq!(config.proxy.route, "/api/modelrunner/proxy");
        assert_eq!(config.proxy.allowed_domains, vec!["modelrunner.run"]);
        assert!(config.proxy.credentials.is_none());
        assert_eq!(config.timeouts.upstream_secs, 60);
    }

    #[test]
    fn test_credentials_never_serialized() {
        let mut config = ServerConfig::default();
        config.proxy.credentials = Some("secret-key".to_string());
        let rendered = toml::to_string(&config).unwrap();
        assert!(!rendered.contains("secret-key"));
        assert!(!format!("{:?}", config).contains("secret-key"));
    }
}
