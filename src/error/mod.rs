//! Error types for linkwatch.
//!
//! | Type | Raised by | Retryable |
//! |------|-----------|-----------|
//! | [`ConnectionError`] | health probe, refresh call | mostly |
//! | [`AuthError`] | login and refresh flows | unless [`AuthError::is_fatal`] |
//! | [`StorageError`] | credential stores | no, the operation is abandoned |

mod auth;
mod network;
mod storage;

pub use auth::AuthError;
pub use network::ConnectionError;
pub use storage::StorageError;
