//! File-backed credential store.
//!
//! The session is one JSON document with three logical keys:
//!
//! ```json
//! {
//!   "access_token": { "token": "...", "expires_at": "2026-10-16T12:00:00Z" },
//!   "refresh_token": "...",
//!   "user": { "id": "...", "username": "...", "role": null }
//! }
//! ```
//!
//! Writes go to a temp file which is then renamed over the live file, so a
//! crash never leaves a half-written session. Every write is read back and
//! compared before it is reported as successful.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::auth::{Credentials, UserProfile};
use crate::error::StorageError;
use crate::traits::CredentialStore;

/// The credentials file name.
const CREDENTIALS_FILE: &str = "credentials.json";

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct AccessTokenEntry {
    token: String,
    expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Serialize, Deserialize, PartialEq)]
struct PersistedSession {
    #[serde(default)]
    access_token: Option<AccessTokenEntry>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    user: Option<UserProfile>,
}

impl From<&Credentials> for PersistedSession {
    fn from(creds: &Credentials) -> Self {
        Self {
            access_token: creds.access_token.as_ref().map(|token| AccessTokenEntry {
                token: token.clone(),
                expires_at: creds.expires_at,
            }),
            refresh_token: creds.refresh_token.clone(),
            user: creds.user.clone(),
        }
    }
}

impl From<PersistedSession> for Credentials {
    fn from(session: PersistedSession) -> Self {
        let (access_token, expires_at) = match session.access_token {
            Some(entry) => (Some(entry.token), entry.expires_at),
            None => (None, None),
        };
        Credentials {
            access_token,
            refresh_token: session.refresh_token,
            expires_at,
            user: session.user,
        }
    }
}

/// Credential store persisting to `<dir>/credentials.json`.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    /// Store inside `dir`, which is created on first save.
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(CREDENTIALS_FILE),
        }
    }

    pub fn credentials_path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        self.path.with_extension("json.tmp")
    }

    async fn read_session(&self) -> Result<Option<PersistedSession>, StorageError> {
        let bytes = match fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StorageError::Read(e.to_string())),
        };
        let session: PersistedSession = serde_json::from_slice(&bytes)?;
        Ok(Some(session))
    }

    async fn write_temp(&self, bytes: &[u8]) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let temp = self.temp_path();
        let mut file = fs::File::create(&temp).await?;
        file.write_all(bytes).await?;
        file.sync_all().await?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&temp, std::fs::Permissions::from_mode(0o600)).await?;
        }

        Ok(())
    }
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn load(&self) -> Result<Option<Credentials>, StorageError> {
        let creds = self.read_session().await?.map(Credentials::from);
        Ok(creds.filter(|c| !c.is_empty()))
    }

    async fn save(&self, creds: &Credentials) -> Result<(), StorageError> {
        let session = PersistedSession::from(creds);
        let bytes = serde_json::to_vec_pretty(&session)?;

        if let Err(e) = self.write_temp(&bytes).await {
            let _ = fs::remove_file(self.temp_path()).await;
            return Err(StorageError::Write(e.to_string()));
        }
        fs::rename(self.temp_path(), &self.path)
            .await
            .map_err(|e| StorageError::Write(e.to_string()))?;

        match self.read_session().await {
            Ok(Some(read_back)) if read_back == session => {
                debug!("Credentials written to {}", self.path.display());
                Ok(())
            }
            Ok(_) => Err(StorageError::Verify(
                "stored session differs from what was written".to_string(),
            )),
            Err(e) => Err(StorageError::Verify(e.to_string())),
        }
    }

    async fn clear(&self) -> Result<(), StorageError> {
        for path in [self.path.clone(), self.temp_path()] {
            match fs::remove_file(&path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!("Failed to remove {}: {}", path.display(), e);
                    return Err(StorageError::Clear(e.to_string()));
                }
            }
        }
        Ok(())
    }
}
