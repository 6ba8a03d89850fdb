//! Credential store trait abstraction.
//!
//! The store is the single writer of durable session state. Every operation
//! reports failure explicitly; nothing is dropped silently.

use async_trait::async_trait;

use crate::auth::Credentials;
use crate::error::StorageError;

/// Durable key/value persistence for the session.
///
/// Three logical keys are kept together: the access token (with its expiry),
/// the refresh token, and the cached user profile. They are written and
/// cleared as a unit.
///
/// # Example
///
/// ```ignore
/// use linkwatch::traits::CredentialStore;
///
/// async fn signed_in<S: CredentialStore>(store: &S) -> bool {
///     matches!(store.load().await, Ok(Some(creds)) if creds.access_token.is_some())
/// }
/// ```
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Load the persisted session.
    ///
    /// `Ok(None)` means nothing is stored.
    async fn load(&self) -> Result<Option<Credentials>, StorageError>;

    /// Persist the session, replacing whatever was stored.
    ///
    /// Implementations verify the write; an `Err` means the previous contents
    /// are still authoritative.
    async fn save(&self, creds: &Credentials) -> Result<(), StorageError>;

    /// Remove every persisted key of the session. Idempotent.
    async fn clear(&self) -> Result<(), StorageError>;
}
