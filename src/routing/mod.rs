//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Subsystem
//!     → RouteRegistrar::register(batch)
//!     → registry.rs (append under write lock, compile table once)
//!     → published Router (ArcSwap)
//!
//! Incoming request
//!     → dispatcher loads the published Router
//!     → handler.rs (RouteHandler::handle)
//! ```
//!
//! # Design Decisions
//! - Registration is rare, dispatch is hot: dispatch never takes the lock
//! - Entries are append-only for the life of the server
//! - Method names outside the supported set are an error, never a silent skip

pub mod entry;
pub mod handler;
pub mod registry;

pub use entry::{Method, RouteEntry, RouteView};
pub use handler::RouteHandler;
pub use registry::{Registry, RegistryError, RouteRegistrar};
