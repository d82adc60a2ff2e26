//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection (loopback)
//!     → request.rs (assign / propagate x-request-id)
//!     → tower-http TraceLayer
//!     → normalize.rs (strip trailing slash)
//!     → recovery.rs (guarded scope, panic → 500)
//!     → registry's published route table
//!     → handler (or introspection.rs for GET /)
//! ```

pub mod error;
pub mod introspection;
pub mod normalize;
pub mod recovery;
pub mod request;
pub mod server;

pub use error::{error_response, ErrorPayload, YAML_CONTENT_TYPE};
pub use recovery::RequestScope;
pub use request::X_REQUEST_ID;
pub use server::{ApiServer, ServerError, ServerState};
