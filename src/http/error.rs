//! Structured error bodies.
//!
//! Failures are reported as a YAML document `{code, message}`, in the same
//! format the route listing uses.

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Content type of every YAML body this server writes.
pub const YAML_CONTENT_TYPE: &str = "text/vnd.yaml";

#[derive(Debug, Error)]
#[error("encode error payload: {0}")]
pub struct CodecError(#[from] serde_yaml::Error);

/// Body of a failure response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub code: u16,
    pub message: String,
}

impl ErrorPayload {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            code: status.as_u16(),
            message: message.into(),
        }
    }

    pub fn encode(&self) -> Result<String, CodecError> {
        Ok(serde_yaml::to_string(self)?)
    }
}

/// Build a failure response carrying an [`ErrorPayload`].
///
/// There is no layer below this one to report to, so a payload that cannot be
/// encoded aborts the process.
pub fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    let payload = ErrorPayload::new(status, message);
    match payload.encode() {
        Ok(body) => (status, [(header::CONTENT_TYPE, YAML_CONTENT_TYPE)], body).into_response(),
        Err(e) => {
            tracing::error!(error = %e, code = payload.code, "failed to encode error payload");
            std::process::abort();
        }
    }
}
