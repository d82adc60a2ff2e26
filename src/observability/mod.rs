//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! registry, recovery, server
//!     → logging.rs (structured log events via tracing)
//!     → metrics.rs (counters)
//! ```

pub mod logging;
pub mod metrics;
