//! Structured logging.
//!
//! # Design Decisions
//! - `tracing` is the only log sink; handler panics are routed here too
//! - `RUST_LOG` overrides the configured level
//! - JSON format for production, text format for development

use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{LogFormat, ObservabilityConfig};

/// Install the global subscriber.
///
/// Fails if a global subscriber is already set.
pub fn init_logging(config: &ObservabilityConfig) -> Result<(), TryInitError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("worker_api={0},tower_http={0}", config.log_level).into());

    let json = config.log_format == LogFormat::Json;
    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| fmt::layer().json()))
        .with((!json).then(|| fmt::layer()))
        .try_init()
}
