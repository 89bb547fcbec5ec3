//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, addresses parse)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: RuntimeConfig → Result<(), Vec<ValidationError>>
//! - Locator cache settings are never rejected here; the router falls back
//!   to safe values and logs instead

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::RuntimeConfig;

/// A semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("listener.bind_address is not a socket address: '{0}'")]
    InvalidBindAddress(String),

    #[error("listener.max_body_bytes must be greater than 0")]
    ZeroBodyLimit,

    #[error("timeouts.request_secs must be greater than 0")]
    ZeroRequestTimeout,

    #[error("observability.metrics_address is not a socket address: '{0}'")]
    InvalidMetricsAddress(String),
}

/// Validate a configuration, returning all errors found.
pub fn validate_config(config: &RuntimeConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidBindAddress(
            config.listener.bind_address.clone(),
        ));
    }
    if config.listener.max_body_bytes == 0 {
        errors.push(ValidationError::ZeroBodyLimit);
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::ZeroRequestTimeout);
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidMetricsAddress(
            config.observability.metrics_address.clone(),
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
    use crate::config::schema::CacheAgeSetting;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&RuntimeConfig::default()).is_ok());
    }

    #[test]
    fn test_reports_every_error() {
        let mut config = RuntimeConfig::default();
        config.listener.bind_address = "nowhere".to_string();
        config.timeouts.request_secs = 0;
        config.observability.metrics_enabled = true;
        config.observability.metrics_address = "x".to_string();

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![
                ValidationError::InvalidBindAddress("nowhere".to_string()),
                ValidationError::ZeroRequestTimeout,
                ValidationError::InvalidMetricsAddress("x".to_string()),
            ]
        );
    }

    #[test]
    fn test_bad_cache_settings_are_not_errors() {
        let mut config = RuntimeConfig::default();
        config.routing.locator_cache_age = Some(CacheAgeSetting::Text("soon".to_string()));
        config.routing.locator_cache_size = -3;
        assert!(validate_config(&config).is_ok());
    }
}
