//! Access/refresh token lifecycle.
//!
//! [`TokenManager`] owns the session credentials, mirrors them into a
//! [`CredentialStore`], and hands out access tokens that are valid for at
//! least `refresh_skew` longer. When the cached token is too close to expiry
//! it is renewed through the refresh endpoint, at most once at a time no
//! matter how many callers ask concurrently.
//!
//! Outcomes are broadcast as [`AuthEvent`]s:
//! - `TokenRefreshed` after a refreshed pair has been persisted
//! - `Logout` when the session ends, whether by request or because the
//!   server rejected the refresh token

use std::sync::{Arc, Mutex, MutexGuard, Weak};

use chrono::Utc;
use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::credentials::{Credentials, TokenGrant, UserProfile};
use super::refresh::RefreshClient;
use crate::config::TokenConfig;
use crate::error::{AuthError, StorageError};
use crate::events::{AuthEvent, SubscriberRegistry, Subscription};
use crate::traits::{CredentialStore, HttpClient};

type SharedRefresh = Shared<BoxFuture<'static, Option<String>>>;

#[derive(Debug, Default)]
struct Session {
    credentials: Option<Credentials>,
    /// Bumped whenever the session is replaced or ended. A refresh that
    /// started under an older epoch is discarded.
    epoch: u64,
}

struct TokenInner {
    config: TokenConfig,
    client: RefreshClient,
    store: Arc<dyn CredentialStore>,
    events: SubscriberRegistry<AuthEvent>,
    session: Mutex<Session>,
    in_flight: Mutex<Option<SharedRefresh>>,
    /// Serializes store writes with the in-memory update that goes with them.
    store_lock: tokio::sync::Mutex<()>,
    proactive: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for TokenInner {
    fn drop(&mut self) {
        let timer = self.proactive.get_mut().unwrap_or_else(|e| e.into_inner());
        if let Some(handle) = timer.take() {
            handle.abort();
        }
    }
}

impl TokenInner {
    fn session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn in_flight(&self) -> MutexGuard<'_, Option<SharedRefresh>> {
        self.in_flight.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn proactive(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.proactive.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn fresh_token(&self) -> Option<String> {
        let session = self.session();
        let creds = session.credentials.as_ref()?;
        if creds.is_fresh_at(Utc::now(), self.config.refresh_skew) {
            creds.access_token.clone()
        } else {
            None
        }
    }

    /// Join the refresh in flight, or start one.
    ///
    /// Without `force`, a token that became fresh since the caller looked is
    /// returned as is.
    fn join_or_start(self: &Arc<Self>, force: bool) -> SharedRefresh {
        let mut slot = self.in_flight();
        if let Some(refresh) = slot.as_ref() {
            debug!("Joining in-flight token refresh");
            return refresh.clone();
        }
        if !force {
            if let Some(token) = self.fresh_token() {
                return futures::future::ready(Some(token)).boxed().shared();
            }
        }

        let inner = Arc::clone(self);
        let task = tokio::spawn(async move {
            let token = inner.run_refresh().await;
            inner.in_flight().take();
            token
        });

        let refresh = async move {
            task.await.unwrap_or_else(|e| {
                error!("Token refresh task failed: {}", e);
                None
            })
        }
        .boxed()
        .shared();
        *slot = Some(refresh.clone());
        refresh
    }

    async fn run_refresh(self: &Arc<Self>) -> Option<String> {
        let (refresh_token, epoch) = {
            let session = self.session();
            match session.credentials.as_ref() {
                Some(creds) => (creds.refresh_token.clone(), session.epoch),
                None => {
                    debug!("No session; nothing to refresh");
                    return None;
                }
            }
        };

        let outcome = match &refresh_token {
            Some(token) => {
                info!("Refreshing access token");
                self.client.refresh(token).await
            }
            None => Err(AuthError::NoRefreshToken),
        };

        match outcome {
            Ok(grant) => self.commit_refresh(grant, refresh_token, epoch).await,
            Err(e) if e.is_fatal() => {
                warn!("Cannot renew session, logging out: {}", e);
                self.end_session(Some(epoch)).await.ok();
                None
            }
            Err(e) => {
                warn!("Token refresh failed, keeping current session: {}", e);
                None
            }
        }
    }

    async fn commit_refresh(
        self: &Arc<Self>,
        grant: TokenGrant,
        previous_refresh_token: Option<String>,
        epoch: u64,
    ) -> Option<String> {
        let write = self.store_lock.lock().await;

        let user = {
            let session = self.session();
            if session.epoch != epoch {
                debug!("Session changed during refresh; discarding refreshed tokens");
                return None;
            }
            session.credentials.as_ref().and_then(|c| c.user.clone())
        };

        let mut creds =
            Credentials::from_grant(&grant, Utc::now(), self.config.default_lifetime, user);
        if creds.refresh_token.is_none() {
            creds.refresh_token = previous_refresh_token;
        }

        if let Err(e) = self.store.save(&creds).await {
            error!("Failed to persist refreshed credentials: {}", e);
            return None;
        }

        let access_token = grant.access_token;
        self.session().credentials = Some(creds);
        drop(write);

        info!("Access token refreshed");
        self.events.notify(&AuthEvent::TokenRefreshed {
            access_token: access_token.clone(),
        });
        self.schedule_proactive();
        Some(access_token)
    }

    /// Drop the session, clear the store and broadcast `Logout`.
    ///
    /// With `expected_epoch`, does nothing if the session has moved on.
    async fn end_session(&self, expected_epoch: Option<u64>) -> Result<(), StorageError> {
        let write = self.store_lock.lock().await;
        {
            let mut session = self.session();
            if expected_epoch.is_some_and(|epoch| epoch != session.epoch) {
                return Ok(());
            }
            session.credentials = None;
            session.epoch += 1;
        }
        self.cancel_proactive();

        let cleared = self.store.clear().await;
        if let Err(e) = &cleared {
            error!("Failed to clear stored credentials: {}", e);
        }
        drop(write);

        self.events.notify(&AuthEvent::Logout);
        cleared
    }

    fn cancel_proactive(&self) {
        if let Some(handle) = self.proactive().take() {
            handle.abort();
        }
    }

    /// Arm the proactive refresh for `expires_at - refresh_skew`.
    ///
    /// Nothing is armed when that moment has already passed; such a session
    /// is renewed on demand by the next caller.
    fn schedule_proactive(self: &Arc<Self>) {
        let due = {
            let session = self.session();
            session
                .credentials
                .as_ref()
                .filter(|c| c.refresh_token.is_some())
                .and_then(|c| c.refresh_due_in(Utc::now(), self.config.refresh_skew))
        };

        let mut timer = self.proactive();
        if let Some(handle) = timer.take() {
            handle.abort();
        }
        let delay = match due {
            Some(delay) if !delay.is_zero() => delay,
            Some(_) => {
                debug!("Token already inside refresh window; renewing on demand");
                return;
            }
            None => return,
        };

        debug!("Proactive refresh in {}s", delay.as_secs());
        let weak: Weak<TokenInner> = Arc::downgrade(self);
        *timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let refresh = match weak.upgrade() {
                Some(inner) => inner.join_or_start(true),
                None => return,
            };
            refresh.await;
        }));
    }
}

/// Session credential manager.
///
/// Cheap to clone; clones share one session. Construct at the application
/// root, call [`initialize`](Self::initialize) once, and hand clones to
/// whatever makes authenticated requests.
#[derive(Clone)]
pub struct TokenManager {
    inner: Arc<TokenInner>,
}

impl std::fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenManager")
            .field("refresh_url", &self.inner.config.refresh_url)
            .field("authenticated", &self.is_authenticated())
            .finish()
    }
}

impl TokenManager {
    pub fn new(
        http: Arc<dyn HttpClient>,
        store: Arc<dyn CredentialStore>,
        config: TokenConfig,
    ) -> Self {
        Self::with_refresh_client(RefreshClient::new(http, config), store)
    }

    pub fn with_refresh_client(client: RefreshClient, store: Arc<dyn CredentialStore>) -> Self {
        Self {
            inner: Arc::new(TokenInner {
                config: client.config().clone(),
                client,
                store,
                events: SubscriberRegistry::new(),
                session: Mutex::new(Session::default()),
                in_flight: Mutex::new(None),
                store_lock: tokio::sync::Mutex::new(()),
                proactive: Mutex::new(None),
            }),
        }
    }

    pub fn config(&self) -> &TokenConfig {
        &self.inner.config
    }

    /// Restore the session persisted by a previous run and arm the proactive
    /// refresh. Returns whether a session was found.
    pub async fn initialize(&self) -> Result<bool, AuthError> {
        let loaded = self.inner.store.load().await?;
        let found = loaded.is_some();
        {
            let _write = self.inner.store_lock.lock().await;
            let mut session = self.inner.session();
            session.credentials = loaded;
            session.epoch += 1;
        }

        if found {
            info!("Restored stored session");
        } else {
            debug!("No stored session");
        }
        self.inner.schedule_proactive();
        Ok(found)
    }

    /// Adopt a freshly issued session.
    ///
    /// The credentials are persisted first; if that fails nothing changes and
    /// the storage error is returned.
    pub async fn login(&self, grant: TokenGrant, user: Option<UserProfile>) -> Result<(), AuthError> {
        let creds =
            Credentials::from_grant(&grant, Utc::now(), self.inner.config.default_lifetime, user);

        {
            let _write = self.inner.store_lock.lock().await;
            self.inner.store.save(&creds).await?;
            let mut session = self.inner.session();
            session.credentials = Some(creds);
            session.epoch += 1;
        }

        info!("Signed in");
        self.inner.schedule_proactive();
        Ok(())
    }

    /// End the session. In-memory state is dropped and `Logout` broadcast
    /// even when clearing the store fails; the failure is still returned.
    pub async fn logout(&self) -> Result<(), AuthError> {
        info!("Signing out");
        self.inner.end_session(None).await?;
        Ok(())
    }

    /// Remove every local trace of an account the server has deleted.
    pub async fn delete_account(&self) -> Result<(), AuthError> {
        info!("Account deleted; removing local session");
        self.inner.end_session(None).await?;
        Ok(())
    }

    /// A usable access token, refreshing first if the cached one expires
    /// within `refresh_skew`.
    ///
    /// Returns None when there is no session, when the session just ended
    /// because the refresh token was rejected, or when a refresh failed
    /// transiently (the session is kept for the next attempt).
    pub async fn get_valid_access_token(&self) -> Option<String> {
        if let Some(token) = self.inner.fresh_token() {
            return Some(token);
        }
        self.inner.join_or_start(false).await
    }

    /// Renew the access token now, joining a refresh already in flight.
    pub async fn refresh_now(&self) -> Option<String> {
        self.inner.join_or_start(true).await
    }

    /// Report that the server answered 401 to a request made with
    /// `rejected_token`.
    ///
    /// If that is still the cached token it is invalidated and a refresh
    /// follows; otherwise the current token is returned.
    pub async fn handle_unauthorized(&self, rejected_token: &str) -> Option<String> {
        {
            let mut session = self.inner.session();
            if let Some(creds) = session.credentials.as_mut() {
                if creds.access_token.as_deref() == Some(rejected_token) {
                    debug!("Cached access token rejected by server");
                    creds.expires_at = None;
                }
            }
        }
        self.get_valid_access_token().await
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner
            .session()
            .credentials
            .as_ref()
            .is_some_and(|c| c.has_token() || c.refresh_token.is_some())
    }

    pub fn current_user(&self) -> Option<UserProfile> {
        self.inner
            .session()
            .credentials
            .as_ref()
            .and_then(|c| c.user.clone())
    }

    /// Snapshot of the in-memory credentials.
    pub fn credentials(&self) -> Option<Credentials> {
        self.inner.session().credentials.clone()
    }

    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&AuthEvent) + Send + Sync + 'static,
    {
        self.inner.events.subscribe(listener)
    }

    pub fn subscribe_channel(
        &self,
    ) -> (tokio::sync::mpsc::UnboundedReceiver<AuthEvent>, Subscription) {
        self.inner.events.subscribe_channel()
    }
}
