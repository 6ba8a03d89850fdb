//! Mock HTTP client for testing.
//!
//! Responses are scripted per URL. Queued responses are consumed in order;
//! once a URL's queue is empty its sticky response (if any) answers every
//! further request. An optional delay simulates latency, which under a paused
//! tokio clock is measured exactly.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::traits::{Headers, HttpClient, HttpError, Response};

/// A recorded HTTP request for verification in tests.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    /// HTTP method (GET or POST)
    pub method: String,
    pub url: String,
    pub headers: Headers,
    /// Request body (for POST requests)
    pub body: Option<String>,
}

/// A scripted outcome.
#[derive(Debug, Clone)]
pub enum MockResponse {
    /// Answer with this response after `delay`.
    Success { response: Response, delay: Duration },
    /// Fail with this error after `delay`.
    Error { error: HttpError, delay: Duration },
    /// Never answer.
    Hang,
}

impl MockResponse {
    pub fn ok(response: Response) -> Self {
        MockResponse::Success {
            response,
            delay: Duration::ZERO,
        }
    }

    pub fn status(status: u16) -> Self {
        Self::ok(Response::new(status, bytes::Bytes::new()))
    }

    pub fn json(status: u16, value: serde_json::Value) -> Self {
        Self::ok(Response::json_body(status, &value))
    }

    pub fn error(error: HttpError) -> Self {
        MockResponse::Error {
            error,
            delay: Duration::ZERO,
        }
    }

    /// Refused connection, the usual "backend is down" outcome.
    pub fn refused() -> Self {
        Self::error(HttpError::ConnectionFailed("connection refused".to_string()))
    }

    /// Same outcome, delivered after `delay`.
    pub fn after(self, delay: Duration) -> Self {
        match self {
            MockResponse::Success { response, .. } => MockResponse::Success { response, delay },
            MockResponse::Error { error, .. } => MockResponse::Error { error, delay },
            MockResponse::Hang => MockResponse::Hang,
        }
    }
}

#[derive(Debug, Default)]
struct Script {
    queued: VecDeque<MockResponse>,
    sticky: Option<MockResponse>,
}

/// Mock HTTP client for testing.
///
/// ```ignore
/// let client = MockHttpClient::new();
/// client.push_response(HEALTH_URL, MockResponse::refused());
/// client.set_response(HEALTH_URL, MockResponse::status(200));
/// // first GET fails, every later GET succeeds
/// ```
#[derive(Debug, Clone, Default)]
pub struct MockHttpClient {
    scripts: Arc<Mutex<HashMap<String, Script>>>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl MockHttpClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the response used once a URL's queue is exhausted.
    pub fn set_response(&self, url: &str, response: MockResponse) {
        let mut scripts = self.scripts.lock().unwrap();
        scripts.entry(url.to_string()).or_default().sticky = Some(response);
    }

    /// Queue a one-shot response for a URL.
    pub fn push_response(&self, url: &str, response: MockResponse) {
        let mut scripts = self.scripts.lock().unwrap();
        scripts
            .entry(url.to_string())
            .or_default()
            .queued
            .push_back(response);
    }

    /// Get all recorded requests.
    pub fn get_requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Number of requests made to `url`.
    pub fn request_count(&self, url: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.url == url)
            .count()
    }

    pub fn clear_requests(&self) {
        self.requests.lock().unwrap().clear();
    }

    fn record_request(&self, method: &str, url: &str, headers: &Headers, body: Option<String>) {
        self.requests.lock().unwrap().push(RecordedRequest {
            method: method.to_string(),
            url: url.to_string(),
            headers: headers.clone(),
            body,
        });
    }

    fn next_response(&self, url: &str) -> Option<MockResponse> {
        let mut scripts = self.scripts.lock().unwrap();
        let script = scripts.get_mut(url)?;
        script.queued.pop_front().or_else(|| script.sticky.clone())
    }

    async fn respond(&self, url: &str) -> Result<Response, HttpError> {
        match self.next_response(url) {
            Some(MockResponse::Success { response, delay }) => {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                Ok(response)
            }
            Some(MockResponse::Error { error, delay }) => {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                Err(error)
            }
            Some(MockResponse::Hang) => std::future::pending::<Result<Response, HttpError>>().await,
            None => Err(HttpError::Other(format!("No mock response for URL: {}", url))),
        }
    }
}

#[async_trait]
impl HttpClient for MockHttpClient {
    async fn get(&self, url: &str, headers: &Headers) -> Result<Response, HttpError> {
        self.record_request("GET", url, headers, None);
        self.respond(url).await
    }

    async fn post(&self, url: &str, body: &str, headers: &Headers) -> Result<Response, HttpError> {
        self.record_request("POST", url, headers, Some(body.to_string()));
        self.respond(url).await
    }
}
