//! Authentication-related error types.
//!
//! These errors come out of the login and refresh flows. The split that
//! matters to callers is [`AuthError::is_fatal`]: a fatal error ends the
//! session, anything else leaves the stored credentials in place for the next
//! attempt.

use thiserror::Error;

use super::{ConnectionError, StorageError};

/// Authentication-specific error variants.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// The refresh endpoint rejected the refresh token.
    #[error("Refresh rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// The refresh call failed before the server could judge the token.
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// The new credentials could not be persisted.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// There is a session but no refresh token to renew it with.
    #[error("No refresh token available")]
    NoRefreshToken,

    /// The server answered 2xx with a body we could not use.
    #[error("Invalid token response: {0}")]
    InvalidResponse(String),
}

impl AuthError {
    /// Status codes on the refresh endpoint that mean the refresh token is
    /// invalid or expired.
    pub const REJECTION_STATUSES: [u16; 3] = [400, 401, 403];

    /// Classify a failed refresh response by status.
    pub fn from_refresh_status(status: u16, message: String) -> Self {
        if Self::REJECTION_STATUSES.contains(&status) {
            AuthError::Rejected { status, message }
        } else {
            AuthError::Connection(ConnectionError::Server { status, message })
        }
    }

    /// Whether this failure ends the session (credentials cleared, logout
    /// broadcast) rather than being retried on the next call.
    pub fn is_fatal(&self) -> bool {
        matches!(self, AuthError::Rejected { .. } | AuthError::NoRefreshToken)
    }
}
