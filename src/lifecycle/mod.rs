//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup:
//!     Load config → Validate → Init logging → Build server → Bind listener
//!
//! Shutdown (shutdown.rs):
//!     close() / signal → Stop accepting → Drain in-flight requests → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Bind failures are fatal; no retry
//! - Shutdown drains, it never cancels running handlers

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
