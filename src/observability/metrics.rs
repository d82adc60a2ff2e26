//! Metrics collection and exposition.
//!
//! # Metrics
//! - `api_routes_registered_total` (counter): routes registered, by method
//! - `api_handler_panics_total` (counter): panics recovered by the middleware
//!
//! Without an installed recorder every call here is a no-op.

use std::net::SocketAddr;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::routing::Method;

pub const ROUTES_REGISTERED: &str = "api_routes_registered_total";
pub const HANDLER_PANICS: &str = "api_handler_panics_total";

/// Install the Prometheus recorder with an HTTP scrape listener on `addr`.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_route_registered(method: Method) {
    metrics::counter!(ROUTES_REGISTERED, "method" => method.as_str()).increment(1);
}

pub fn record_handler_panic() {
    metrics::counter!(HANDLER_PANICS).increment(1);
}
