//! Session credentials and the token grant that produces them.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Cached profile of the signed-in user.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserProfile {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub role: Option<String>,
}

/// Authentication credentials for the console backend.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Credentials {
    /// Bearer token for authenticated API calls.
    pub access_token: Option<String>,
    /// Token used to obtain a new access token.
    pub refresh_token: Option<String>,
    /// Absolute expiry of the access token.
    pub expires_at: Option<DateTime<Utc>>,
    /// Cached user profile.
    pub user: Option<UserProfile>,
}

impl Credentials {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build credentials from a grant issued at `issued_at`.
    pub fn from_grant(
        grant: &TokenGrant,
        issued_at: DateTime<Utc>,
        fallback_lifetime: Duration,
        user: Option<UserProfile>,
    ) -> Self {
        let lifetime = grant
            .lifetime()
            .or_else(|| jwt_lifetime(&grant.access_token, issued_at))
            .unwrap_or(fallback_lifetime);

        Self {
            access_token: Some(grant.access_token.clone()),
            refresh_token: grant.refresh_token.clone(),
            expires_at: Some(issued_at + to_chrono(lifetime)),
            user,
        }
    }

    pub fn has_token(&self) -> bool {
        self.access_token.is_some()
    }

    /// Whether there is anything worth persisting.
    pub fn is_empty(&self) -> bool {
        self.access_token.is_none()
            && self.refresh_token.is_none()
            && self.expires_at.is_none()
            && self.user.is_none()
    }

    /// Whether the access token is usable at `now` with `skew` to spare.
    pub fn is_fresh_at(&self, now: DateTime<Utc>, skew: Duration) -> bool {
        match (&self.access_token, self.expires_at) {
            (Some(_), Some(expires_at)) => now < expires_at - to_chrono(skew),
            _ => false,
        }
    }

    /// Time from `now` until the token should be renewed, zero if overdue.
    pub fn refresh_due_in(&self, now: DateTime<Utc>, skew: Duration) -> Option<Duration> {
        let expires_at = self.expires_at?;
        let due = expires_at - to_chrono(skew);
        Some((due - now).to_std().unwrap_or(Duration::ZERO))
    }
}

/// Token pair as returned by login and refresh endpoints.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenGrant {
    pub access_token: String,
    /// Absent when the server keeps the current refresh token.
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Lifetime in seconds.
    #[serde(default)]
    pub expires_in: Option<u64>,
}

impl TokenGrant {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: Some(refresh_token.into()),
            expires_in: None,
        }
    }

    pub fn with_expires_in(mut self, secs: u64) -> Self {
        self.expires_in = Some(secs);
        self
    }

    pub fn lifetime(&self) -> Option<Duration> {
        self.expires_in.map(Duration::from_secs)
    }
}

#[derive(Deserialize)]
struct JwtClaims {
    exp: i64,
}

/// Remaining lifetime of a JWT access token, read from its `exp` claim.
///
/// Returns None for opaque tokens or tokens already past `exp`.
pub fn jwt_lifetime(access_token: &str, now: DateTime<Utc>) -> Option<Duration> {
    let payload = URL_SAFE_NO_PAD.decode(access_token.split('.').nth(1)?).ok()?;
    let claims: JwtClaims = serde_json::from_slice(&payload).ok()?;
    let remaining = claims.exp.checked_sub(now.timestamp())?;
    u64::try_from(remaining)
        .ok()
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs)
}

/// Capped at a century so that date arithmetic cannot overflow.
fn to_chrono(d: Duration) -> ChronoDuration {
    let cap = ChronoDuration::days(36_500);
    ChronoDuration::from_std(d).map_or(cap, |d| d.min(cap))
}
