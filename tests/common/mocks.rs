//! Mock wiring for integration tests.
//!
//! Re-exports the doubles from `linkwatch::adapters::mock` and adds harnesses
//! that wire them into a monitor or token manager.

pub use linkwatch::adapters::mock::{InMemoryCredentialStore, MockHttpClient, MockResponse};

use std::sync::Arc;

use linkwatch::auth::{Credentials, TokenManager};
use linkwatch::config::{MonitorConfig, TokenConfig};
use linkwatch::events::{AuthEvent, Subscription};
use linkwatch::health::{ConnectionMonitor, ConnectionState, ConnectionStatus};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::Instant;

use super::{HEALTH_URL, REFRESH_URL};

/// A monitor driven by a scripted HTTP client, with every published state
/// captured on a channel.
pub struct MonitorHarness {
    pub http: MockHttpClient,
    pub monitor: ConnectionMonitor,
    pub states: UnboundedReceiver<ConnectionState>,
    pub started: Instant,
    _subscription: Subscription,
}

impl MonitorHarness {
    pub fn new(config: MonitorConfig) -> Self {
        let http = MockHttpClient::new();
        let monitor = ConnectionMonitor::new(
            Arc::new(http.clone()),
            config.with_health_url(HEALTH_URL),
        );
        let (states, subscription) = monitor.subscribe_channel();
        Self {
            http,
            monitor,
            states,
            started: Instant::now(),
            _subscription: subscription,
        }
    }

    pub fn start(&mut self) {
        self.started = Instant::now();
        self.monitor.start();
    }

    /// Next published state, whatever it is.
    pub async fn next_state(&mut self) -> ConnectionState {
        self.states.recv().await.expect("monitor dropped")
    }

    /// Next probe outcome, skipping `Checking` states, with the time since
    /// `start()` at which it was published.
    pub async fn next_outcome(&mut self) -> (ConnectionState, std::time::Duration) {
        loop {
            let state = self.next_state().await;
            if state.status != ConnectionStatus::Checking {
                return (state, self.started.elapsed());
            }
        }
    }

    pub fn probes(&self) -> usize {
        self.http.request_count(HEALTH_URL)
    }
}

/// A token manager over scripted HTTP and an in-memory store.
pub struct TokenHarness {
    pub http: MockHttpClient,
    pub store: InMemoryCredentialStore,
    pub manager: TokenManager,
    pub events: UnboundedReceiver<AuthEvent>,
    _subscription: Subscription,
}

impl TokenHarness {
    pub fn new(stored: Option<Credentials>, config: TokenConfig) -> Self {
        let http = MockHttpClient::new();
        let store = InMemoryCredentialStore::new();
        store.set_credentials(stored);
        let manager = TokenManager::new(
            Arc::new(http.clone()),
            Arc::new(store.clone()),
            config.with_refresh_url(REFRESH_URL),
        );
        let (events, subscription) = manager.subscribe_channel();
        Self {
            http,
            store,
            manager,
            events,
            _subscription: subscription,
        }
    }

    pub fn refreshes(&self) -> usize {
        self.http.request_count(REFRESH_URL)
    }

    /// Events published so far, without waiting.
    pub fn drain_events(&mut self) -> Vec<AuthEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }
}
