//! Dynamically extensible HTTP control-plane server.
//!
//! Subsystems register routes at runtime through a [`RouteRegistrar`]; the
//! server lists them on `GET /` and turns handler panics into structured 500s.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod routing;

pub use config::ApiConfig;
pub use http::{ApiServer, ServerError, ServerState};
pub use lifecycle::Shutdown;
pub use routing::{Method, RouteEntry, RouteHandler, RouteRegistrar, RouteView};
