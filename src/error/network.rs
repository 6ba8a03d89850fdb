//! Network-related error types.
//!
//! These are the classified outcomes of a failed request against the backend,
//! shared by the health probe and the token refresh call.

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::traits::HttpError;

/// Classified failure of a single request.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConnectionError {
    /// No response at all (DNS failure, refused connection, reset).
    #[error("Network error: {message}")]
    Network { message: String },

    /// The request did not complete within its bound.
    #[error("Request timed out after {}ms", .after.as_millis())]
    Timeout { after: Duration },

    /// The server answered with a non-2xx status.
    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },
}

impl ConnectionError {
    /// Build a network error from any displayable cause.
    pub fn network(message: impl Into<String>) -> Self {
        ConnectionError::Network {
            message: message.into(),
        }
    }

    /// HTTP status carried by the error, if the server responded.
    pub fn status(&self) -> Option<u16> {
        match self {
            ConnectionError::Server { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Short machine-readable code for logs.
    pub fn error_code(&self) -> &'static str {
        match self {
            ConnectionError::Network { .. } => "NET_UNREACHABLE",
            ConnectionError::Timeout { .. } => "NET_TIMEOUT",
            ConnectionError::Server { .. } => "NET_HTTP_STATUS",
        }
    }

    /// Map an adapter-level error, given the bound the caller enforced.
    pub fn from_http(err: HttpError, bound: Duration) -> Self {
        match err {
            HttpError::Timeout(_) => ConnectionError::Timeout { after: bound },
            HttpError::ConnectionFailed(msg)
            | HttpError::Io(msg)
            | HttpError::InvalidUrl(msg)
            | HttpError::Other(msg) => ConnectionError::Network { message: msg },
        }
    }
}
