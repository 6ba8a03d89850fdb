//! Single bounded-time health probe.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio::time::Instant;
use tracing::debug;

use crate::error::ConnectionError;
use crate::traits::{Headers, HttpClient};

/// Outcome of a successful probe.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeSuccess {
    /// Round-trip time of the request.
    pub latency: Duration,
    /// When the probe completed.
    pub timestamp: DateTime<Utc>,
    /// `status` field of the health body, when the server sent one.
    pub server_status: Option<String>,
}

/// Lenient view of a health body; every field is optional.
#[derive(Debug, Default, Deserialize)]
struct HealthBody {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    timestamp: Option<serde_json::Value>,
}

/// Issues one GET against the health endpoint and classifies the outcome.
///
/// Stateless apart from its configuration; never retries.
#[derive(Clone)]
pub struct HealthCheckProbe {
    http: Arc<dyn HttpClient>,
    url: String,
    timeout: Duration,
}

impl std::fmt::Debug for HealthCheckProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthCheckProbe")
            .field("url", &self.url)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl HealthCheckProbe {
    pub fn new(http: Arc<dyn HttpClient>, url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            http,
            url: url.into(),
            timeout,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run the probe.
    pub async fn check(&self) -> Result<ProbeSuccess, ConnectionError> {
        let mut headers = Headers::new();
        headers.insert("Accept".to_string(), "application/json".to_string());
        headers.insert("Cache-Control".to_string(), "no-cache".to_string());

        let start = Instant::now();
        let outcome = tokio::time::timeout(self.timeout, self.http.get(&self.url, &headers)).await;
        let latency = start.elapsed();

        let response = match outcome {
            Err(_) => {
                return Err(ConnectionError::Timeout {
                    after: self.timeout,
                })
            }
            Ok(Err(e)) => return Err(ConnectionError::from_http(e, self.timeout)),
            Ok(Ok(response)) => response,
        };

        if !response.is_success() {
            return Err(ConnectionError::Server {
                status: response.status,
                message: response.text_snippet(200),
            });
        }

        let body: HealthBody = response.json().unwrap_or_default();
        if body.status.is_none() && body.timestamp.is_none() {
            debug!("Health endpoint {} returned no status/timestamp fields", self.url);
        }

        Ok(ProbeSuccess {
            latency,
            timestamp: Utc::now(),
            server_status: body.status,
        })
    }
}
