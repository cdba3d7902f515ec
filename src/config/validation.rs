//! Semantic validation of the relay configuration.
//!
//! Serde handles syntax; this checks values. All problems are reported at
//! once, not just the first.

use std::net::SocketAddr;

use crate::config::schema::ServerConfig;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// One configuration problem.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

pub fn validate_config(config: &ServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }

    let route = &config.proxy.route;
    if !route.starts_with('/') || route.len() < 2 {
        errors.push(ValidationError::new("proxy.route", "must be an absolute path other than '/'"));
    } else if route == "/health" {
        errors.push(ValidationError::new("proxy.route", "'/health' is reserved"));
    }

    if config.proxy.allowed_domains.is_empty() {
        errors.push(ValidationError::new("proxy.allowed_domains", "at least one domain is required"));
    }
    for domain in &config.proxy.allowed_domains {
        let bare = domain.trim().trim_start_matches('.');
        if bare.is_empty() || bare.contains('/') || bare.contains(':') || bare.contains('*') {
            errors.push(ValidationError::new(
                "proxy.allowed_domains",
                format!("'{}' must be a bare domain name", domain),
            ));
        }
    }

    if matches!(&config.proxy.credentials, Some(key) if key.trim().is_empty()) {
        errors.push(ValidationError::new("proxy.credentials", "must not be blank when set"));
    }

    if config.proxy.max_body_bytes == 0 {
        errors.push(ValidationError::new("proxy.max_body_bytes", "must be greater than 0"));
    }

    for (field, value) in [
        ("timeouts.connect_secs", config.timeouts.connect_secs),
        ("timeouts.upstream_secs", config.timeouts.upstream_secs),
        ("timeouts.request_secs", config.timeouts.request_secs),
    ] {
        if value == 0 {
            errors.push(ValidationError::new(field, "must be greater than 0"));
        }
    }

    if !LOG_LEVELS.contains(&config.observability.log_level.as_str()) {
        errors.push(ValidationError::new(
            "observability.log_level",
            format!("expected one of {}", LOG_LEVELS.join(", ")),
        ));
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", config.observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&ServerConfig::default()).is_ok());
    }

    #[test]
    fn test_blank_credentials_rejected() {
        let mut config = ServerConfig::default();
        config.proxy.credentials = Some(String::new());
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "proxy.credentials");

        config.proxy.credentials = Some("id:secret".to_string());
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_collects_every_error() {
        let mut config = ServerConfig::default();
        config.listener.bind_address = "nowhere".to_string();
        config.proxy.route = "/health".to_string();
        config.proxy.allowed_domains = vec!["https://modelrunner.run".to_string()];
        config.timeouts.upstream_secs = 0;

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            vec![
                "listener.bind_address",
                "proxy.route",
                "proxy.allowed_domains",
                "timeouts.upstream_secs"
            ]
        );
    }
}
