//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ApiConfig {
    /// API server settings.
    pub server: ServerConfig,

    /// Logging and metrics settings.
    pub observability: ObservabilityConfig,
}

/// API server configuration.
///
/// The server always binds the loopback address; only the port is
/// configurable.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Port to listen on (0 picks an ephemeral port).
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 13009 }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` overrides it.
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable the Prometheus metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ApiConfig::default();
        assert_eq!(config.server.port, 13009);
        assert_eq!(config.observability.log_level, "info");
        assert_eq!(config.observability.log_format, LogFormat::Text);
        assert!(!config.observability.metrics_enabled);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: ApiConfig = toml::from_str(
            r#"
            [server]
            port = 8088

            [observability]
            log_format = "json"
            "#,
        )
        .unwrap();

        assert_eq!(config.server.port, 8088);
        assert_eq!(config.observability.log_format, LogFormat::Json);
        assert_eq!(config.observability.log_level, "info");
    }
}
