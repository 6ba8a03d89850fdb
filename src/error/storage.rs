//! Credential persistence errors.

use thiserror::Error;

/// Failure of a credential store operation.
///
/// A `save` that returns any of these must be treated as not having happened.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    /// Stored credentials could not be read.
    #[error("Failed to read credentials: {0}")]
    Read(String),

    /// Credentials could not be written.
    #[error("Failed to write credentials: {0}")]
    Write(String),

    /// The write completed but reading it back did not match.
    #[error("Credential write could not be verified: {0}")]
    Verify(String),

    /// Stored credentials could not be removed.
    #[error("Failed to clear credentials: {0}")]
    Clear(String),

    /// Stored data is not valid credential JSON.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        StorageError::Serialization(e.to_string())
    }
}
