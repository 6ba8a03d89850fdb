//! Client for the token refresh endpoint.

use std::sync::Arc;

use tracing::debug;

use super::credentials::TokenGrant;
use crate::config::TokenConfig;
use crate::error::{AuthError, ConnectionError};
use crate::traits::{Headers, HttpClient};

/// Exchanges a refresh token for a new grant.
///
/// POST `{refresh_url}` with `{"refresh_token": "..."}`. One attempt per
/// call, bounded by `refresh_timeout`.
#[derive(Clone)]
pub struct RefreshClient {
    http: Arc<dyn HttpClient>,
    config: TokenConfig,
}

impl std::fmt::Debug for RefreshClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshClient")
            .field("refresh_url", &self.config.refresh_url)
            .finish()
    }
}

impl RefreshClient {
    pub fn new(http: Arc<dyn HttpClient>, config: TokenConfig) -> Self {
        Self { http, config }
    }

    pub fn config(&self) -> &TokenConfig {
        &self.config
    }

    /// Request a new grant.
    ///
    /// # Errors
    ///
    /// - [`AuthError::Rejected`] for 400/401/403
    /// - [`AuthError::Connection`] for transport failures, timeouts and other
    ///   non-2xx statuses
    /// - [`AuthError::InvalidResponse`] for a 2xx body that is not a grant
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, AuthError> {
        let body = serde_json::json!({
            "refresh_token": refresh_token,
        })
        .to_string();

        let mut headers = Headers::new();
        headers.insert("Content-Type".to_string(), "application/json".to_string());
        headers.insert("Accept".to_string(), "application/json".to_string());

        let timeout = self.config.refresh_timeout;
        let response = match tokio::time::timeout(
            timeout,
            self.http.post(&self.config.refresh_url, &body, &headers),
        )
        .await
        {
            Err(_) => return Err(ConnectionError::Timeout { after: timeout }.into()),
            Ok(Err(e)) => return Err(ConnectionError::from_http(e, timeout).into()),
            Ok(Ok(response)) => response,
        };

        if !response.is_success() {
            debug!("Refresh endpoint answered {}", response.status);
            return Err(AuthError::from_refresh_status(
                response.status,
                response.text_snippet(200),
            ));
        }

        let grant: TokenGrant = response
            .json()
            .map_err(|e| AuthError::InvalidResponse(e.to_string()))?;
        if grant.access_token.is_empty() {
            return Err(AuthError::InvalidResponse(
                "empty access_token".to_string(),
            ));
        }
        Ok(grant)
    }
}
