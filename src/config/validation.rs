//! Configuration validation.
//!
//! # Design Decisions
//! - Returns all validation errors, not just the first
//! - Pure function: `&ApiConfig → Result<(), Vec<ValidationError>>`

use std::net::SocketAddr;

use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::config::schema::ApiConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("unknown log level {0:?}")]
    LogLevel(String),

    #[error("invalid metrics address {0:?}")]
    MetricsAddress(String),
}

/// Check the semantic constraints serde cannot express.
pub fn validate_config(config: &ApiConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let observability = &config.observability;

    if observability.log_level.parse::<LevelFilter>().is_err() {
        errors.push(ValidationError::LogLevel(observability.log_level.clone()));
    }

    if observability.metrics_enabled
        && observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::MetricsAddress(
            observability.metrics_address.clone(),
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
        assert!(validate_config(&ApiConfig::default()).is_ok());
    }

    #[test]
    fn test_collects_every_error() {
        let mut config = ApiConfig::default();
        config.observability.log_level = "loud".into();
        config.observability.metrics_enabled = true;
        config.observability.metrics_address = "nowhere".into();

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![
                ValidationError::LogLevel("loud".into()),
                ValidationError::MetricsAddress("nowhere".into()),
            ]
        );
    }

    #[test]
    fn test_metrics_address_ignored_when_disabled() {
        let mut config = ApiConfig::default();
        config.observability.metrics_address = "nowhere".into();
        assert!(validate_config(&config).is_ok());
    }
}
