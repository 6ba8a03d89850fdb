//! In-memory credential store for testing.
//!
//! Failures can be injected per operation to exercise the storage-error
//! paths of the token manager.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::auth::Credentials;
use crate::error::StorageError;
use crate::traits::CredentialStore;

/// In-memory credential store.
///
/// Clones share state, so a test can keep one handle while the token manager
/// owns another.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCredentialStore {
    credentials: Arc<Mutex<Option<Credentials>>>,
    save_should_fail: Arc<AtomicBool>,
    load_should_fail: Arc<AtomicBool>,
    clear_should_fail: Arc<AtomicBool>,
    saves: Arc<AtomicUsize>,
    clears: Arc<AtomicUsize>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_credentials(creds: Credentials) -> Self {
        let store = Self::new();
        store.set_credentials(Some(creds));
        store
    }

    pub fn set_save_should_fail(&self, should_fail: bool) {
        self.save_should_fail.store(should_fail, Ordering::SeqCst);
    }

    pub fn set_load_should_fail(&self, should_fail: bool) {
        self.load_should_fail.store(should_fail, Ordering::SeqCst);
    }

    pub fn set_clear_should_fail(&self, should_fail: bool) {
        self.clear_should_fail.store(should_fail, Ordering::SeqCst);
    }

    /// Current contents, bypassing failure injection.
    pub fn get_credentials(&self) -> Option<Credentials> {
        self.credentials.lock().unwrap().clone()
    }

    pub fn set_credentials(&self, creds: Option<Credentials>) {
        *self.credentials.lock().unwrap() = creds;
    }

    /// Number of successful saves.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// Number of successful clears.
    pub fn clear_count(&self) -> usize {
        self.clears.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn load(&self) -> Result<Option<Credentials>, StorageError> {
        if self.load_should_fail.load(Ordering::SeqCst) {
            return Err(StorageError::Read("Mock load failure".to_string()));
        }
        Ok(self.credentials.lock().unwrap().clone())
    }

    async fn save(&self, creds: &Credentials) -> Result<(), StorageError> {
        if self.save_should_fail.load(Ordering::SeqCst) {
            return Err(StorageError::Write("Mock save failure".to_string()));
        }
        *self.credentials.lock().unwrap() = Some(creds.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn clear(&self) -> Result<(), StorageError> {
        if self.clear_should_fail.load(Ordering::SeqCst) {
            return Err(StorageError::Clear("Mock clear failure".to_string()));
        }
        *self.credentials.lock().unwrap() = None;
        self.clears.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
