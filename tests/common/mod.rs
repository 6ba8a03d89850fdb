//! Common test utilities for integration tests.
//!
//! Fixtures for credentials and grants plus the harnesses in [`mocks`].
//!
//! # Example
//!
//! ```ignore
//! let mut harness = MonitorHarness::new(fast_monitor_config());
//! harness.http.set_response(HEALTH_URL, MockResponse::json(200, healthy_body()));
//! harness.start();
//! let (state, _) = harness.next_outcome().await;
//! ```

#![allow(dead_code)]

pub mod mocks;

pub use mocks::*;

use chrono::{Duration as ChronoDuration, Utc};
use linkwatch::auth::{Credentials, UserProfile};
use linkwatch::config::MonitorConfig;
use std::time::Duration;

pub const HEALTH_URL: &str = "https://console.test/api/health";
pub const REFRESH_URL: &str = "https://console.test/api/auth/refresh";

/// Monitor config with small round numbers: base 10s, ceiling 60s,
/// degraded at 1s, down after 3 failures.
pub fn fast_monitor_config() -> MonitorConfig {
    MonitorConfig::default()
        .with_base_interval(Duration::from_secs(10))
        .with_backoff_multiplier(2.0)
        .with_max_interval(Duration::from_secs(60))
        .with_degraded_latency(Duration::from_secs(1))
        .with_down_threshold(3)
        .with_probe_timeout(Duration::from_secs(5))
}

pub fn healthy_body() -> serde_json::Value {
    serde_json::json!({"status": "ok", "timestamp": "2026-10-16T12:00:00Z"})
}

pub fn test_user() -> UserProfile {
    UserProfile {
        id: "user-1".to_string(),
        username: "operator".to_string(),
        role: Some("admin".to_string()),
    }
}

/// Credentials whose access token expires `secs` from now (negative for
/// already expired).
pub fn credentials_expiring_in(secs: i64) -> Credentials {
    Credentials {
        access_token: Some("stored-access-token".to_string()),
        refresh_token: Some("stored-refresh-token".to_string()),
        expires_at: Some(Utc::now() + ChronoDuration::seconds(secs)),
        user: Some(test_user()),
    }
}

pub fn refreshed_body() -> serde_json::Value {
    serde_json::json!({
        "access_token": "refreshed-access-token",
        "refresh_token": "refreshed-refresh-token",
        "expires_in": 3600
    })
}
