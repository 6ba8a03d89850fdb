//! Connection state machine.
//!
//! [`ConnectionMonitor`] drives the [`HealthCheckProbe`] on a schedule,
//! classifies each outcome into a [`ConnectionStatus`], and publishes every
//! new [`ConnectionState`] snapshot to its subscribers.
//!
//! Scheduling: the probe interval starts at `base_interval`, is multiplied by
//! `backoff_multiplier` after each failure (capped at `max_interval`) and is
//! reset to `base_interval` by any success.
//!
//! Lifecycle: `start()` spawns the probe loop onto the current tokio runtime;
//! `stop()` cancels the pending timer and discards the result of a probe that
//! is still in flight. Probes never overlap: the loop and
//! [`ConnectionMonitor::check_connection`] share one gate, and whoever finds
//! the gate busy adopts the in-flight probe's result instead of issuing
//! another.

use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::probe::{HealthCheckProbe, ProbeSuccess};
use super::state::{ConnectionState, ConnectionStatus};
use crate::config::MonitorConfig;
use crate::error::ConnectionError;
use crate::events::{SubscriberRegistry, Subscription};
use crate::traits::HttpClient;

/// Mutable core of the monitor. All transitions go through here.
#[derive(Debug)]
struct Machine {
    state: ConnectionState,
    interval: Duration,
    running: bool,
    generation: u64,
    /// Last success, or start/reset time if none since.
    downtime_anchor: Instant,
    /// Probe results applied so far; lets a waiter tell whether the probe it
    /// waited on counted.
    applied: u64,
}

impl Machine {
    fn new(config: &MonitorConfig) -> Self {
        Self {
            state: ConnectionState::checking(config.probe_interval()),
            interval: config.probe_interval(),
            running: false,
            generation: 0,
            downtime_anchor: Instant::now(),
            applied: 0,
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        self.running && self.generation == generation
    }

    fn start(&mut self, config: &MonitorConfig, now: Instant) -> ConnectionState {
        self.running = true;
        self.generation += 1;
        self.interval = config.probe_interval();
        self.downtime_anchor = now;
        self.state = ConnectionState::checking(config.probe_interval());
        self.state.clone()
    }

    /// Enter `Checking` for a new probe.
    ///
    /// Only a monitor whose last probe succeeded passes through `Checking`.
    /// During a failure streak the failing status is kept until the next
    /// result, so a published `Checking` never carries downtime.
    fn begin_probe(&mut self) -> Option<ConnectionState> {
        let succeeded = self.state.retry_count == 0;
        match self.state.status {
            ConnectionStatus::Healthy | ConnectionStatus::Degraded if succeeded => {
                self.state.status = ConnectionStatus::Checking;
                self.state.downtime = Duration::ZERO;
                Some(self.state.clone())
            }
            _ => None,
        }
    }

    fn apply(
        &mut self,
        outcome: &Result<ProbeSuccess, ConnectionError>,
        config: &MonitorConfig,
        now: Instant,
    ) -> ConnectionState {
        self.applied += 1;

        match outcome {
            Ok(success) => {
                self.interval = config.probe_interval();
                self.downtime_anchor = now;

                let state = &mut self.state;
                state.status = if success.latency >= config.degraded_latency {
                    ConnectionStatus::Degraded
                } else {
                    ConnectionStatus::Healthy
                };
                state.last_check = Some(success.timestamp);
                state.last_successful_connection = Some(success.timestamp);
                state.downtime = Duration::ZERO;
                state.retry_count = 0;
                state.error = None;
                state.latency = Some(success.latency);
            }
            Err(error) => {
                self.interval = config.next_backoff(self.interval);

                let state = &mut self.state;
                state.retry_count = state.retry_count.saturating_add(1);
                state.status = if state.retry_count >= config.down_threshold {
                    ConnectionStatus::Down
                } else {
                    ConnectionStatus::Degraded
                };
                state.last_check = Some(Utc::now());
                state.downtime = now.duration_since(self.downtime_anchor);
                state.error = Some(error.clone());
            }
        }

        self.state.next_interval = self.interval;
        self.state.clone()
    }

    fn reset_retries(&mut self, config: &MonitorConfig, now: Instant) -> ConnectionState {
        self.interval = config.probe_interval();
        self.downtime_anchor = now;
        self.state.retry_count = 0;
        self.state.downtime = Duration::ZERO;
        self.state.next_interval = self.interval;
        self.state.clone()
    }
}

struct MonitorInner {
    config: MonitorConfig,
    probe: HealthCheckProbe,
    subscribers: SubscriberRegistry<ConnectionState>,
    machine: Mutex<Machine>,
    /// Serializes transition + delivery so listeners see states in order.
    publish: Mutex<()>,
    /// Held for the duration of a probe.
    probe_gate: tokio::sync::Mutex<()>,
    /// Wakes the schedule loop to re-arm its timer or notice a stop.
    wake: Arc<Notify>,
}

impl Drop for MonitorInner {
    fn drop(&mut self) {
        self.wake.notify_waiters();
    }
}

impl MonitorInner {
    fn machine(&self) -> MutexGuard<'_, Machine> {
        self.machine.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Mutate the machine and deliver the resulting snapshot, if any.
    fn transition<F>(&self, f: F) -> Option<ConnectionState>
    where
        F: FnOnce(&mut Machine) -> Option<ConnectionState>,
    {
        let _order = self.publish.lock().unwrap_or_else(|e| e.into_inner());

        let (previous, snapshot) = {
            let mut machine = self.machine();
            let previous = machine.state.status;
            (previous, f(&mut machine))
        };

        if let Some(state) = &snapshot {
            if state.status != previous {
                info!("Connection status {} -> {}", previous, state.status);
            }
            self.subscribers.notify(state);
        }
        snapshot
    }

    fn current_interval(&self, generation: u64) -> Option<Duration> {
        let machine = self.machine();
        machine.is_current(generation).then_some(machine.interval)
    }

    /// Probe once under the gate, unless the gate is busy, in which case wait
    /// for the in-flight probe and adopt its result.
    ///
    /// Returns false once `generation` is no longer current.
    async fn probe_or_join(&self, generation: u64) -> bool {
        let applied_before = self.machine().applied;

        let _gate = match self.probe_gate.try_lock() {
            Ok(gate) => gate,
            Err(_) => {
                let gate = self.probe_gate.lock().await;
                if self.machine().applied != applied_before {
                    debug!("Joined in-flight health probe");
                    return self.machine().is_current(generation);
                }
                gate
            }
        };

        self.probe_once(generation).await
    }

    async fn probe_once(&self, generation: u64) -> bool {
        let mut current = true;
        self.transition(|m| {
            if !m.is_current(generation) {
                current = false;
                return None;
            }
            m.begin_probe()
        });
        if !current {
            return false;
        }

        let outcome = self.probe.check().await;
        match &outcome {
            Ok(success) => debug!(
                "Health probe ok in {}ms ({})",
                success.latency.as_millis(),
                self.probe.url()
            ),
            Err(e) => warn!("Health probe failed [{}]: {}", e.error_code(), e),
        }

        let mut current = true;
        let config = &self.config;
        self.transition(|m| {
            if !m.is_current(generation) {
                current = false;
                return None;
            }
            Some(m.apply(&outcome, config, Instant::now()))
        });
        if !current {
            debug!("Monitor stopped during probe; result discarded");
        }
        current
    }
}

/// Schedule loop. Holds only a weak reference between probes so that dropping
/// the last [`ConnectionMonitor`] handle ends it.
async fn run_schedule(inner: Weak<MonitorInner>, wake: Arc<Notify>, generation: u64) {
    loop {
        match inner.upgrade() {
            Some(strong) => {
                if !strong.probe_or_join(generation).await {
                    return;
                }
            }
            None => return,
        }

        // Sleep until the next probe, restarting the timer whenever woken.
        loop {
            let notified = wake.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let interval = match inner.upgrade() {
                Some(strong) => match strong.current_interval(generation) {
                    Some(interval) => interval,
                    None => return,
                },
                None => return,
            };

            tokio::select! {
                _ = tokio::time::sleep(interval) => break,
                _ = &mut notified => continue,
            }
        }
    }
}

/// Background health monitor for the backend API.
///
/// Cheap to clone; all clones drive the same state machine. Construct one at
/// the application root and hand clones to consumers.
///
/// ```ignore
/// let monitor = ConnectionMonitor::new(http, MonitorConfig::new(api_url));
/// monitor.subscribe(|state| println!("backend is {}", state.status)).detach();
/// monitor.start();
/// ```
///
/// Listeners run synchronously on the task that produced the transition.
/// They must not call `start`, `stop` or `reset_retries` directly; spawn a
/// task for that.
#[derive(Clone)]
pub struct ConnectionMonitor {
    inner: Arc<MonitorInner>,
}

impl std::fmt::Debug for ConnectionMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionMonitor")
            .field("config", &self.inner.config)
            .field("state", &self.state())
            .finish()
    }
}

impl ConnectionMonitor {
    /// Monitor probing `config.health_url` through `http`.
    pub fn new(http: Arc<dyn HttpClient>, config: MonitorConfig) -> Self {
        let probe = HealthCheckProbe::new(http, config.health_url.clone(), config.probe_timeout);
        Self::with_probe(probe, config)
    }

    /// Monitor using a prebuilt probe.
    pub fn with_probe(probe: HealthCheckProbe, config: MonitorConfig) -> Self {
        Self {
            inner: Arc::new(MonitorInner {
                machine: Mutex::new(Machine::new(&config)),
                config,
                probe,
                subscribers: SubscriberRegistry::new(),
                publish: Mutex::new(()),
                probe_gate: tokio::sync::Mutex::new(()),
                wake: Arc::new(Notify::new()),
            }),
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.inner.config
    }

    /// Current snapshot.
    pub fn state(&self) -> ConnectionState {
        self.inner.machine().state.clone()
    }

    pub fn is_running(&self) -> bool {
        self.inner.machine().running
    }

    /// Register a listener for every published state.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&ConnectionState) + Send + Sync + 'static,
    {
        self.inner.subscribers.subscribe(listener)
    }

    /// Receive every published state on a channel.
    pub fn subscribe_channel(
        &self,
    ) -> (
        tokio::sync::mpsc::UnboundedReceiver<ConnectionState>,
        Subscription,
    ) {
        self.inner.subscribers.subscribe_channel()
    }

    /// Begin monitoring. Publishes the initial `Checking` state and probes
    /// immediately. No-op if already running.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) {
        let mut generation = None;
        let config = &self.inner.config;
        self.inner.transition(|m| {
            if m.running {
                return None;
            }
            let state = m.start(config, Instant::now());
            generation = Some(m.generation);
            Some(state)
        });

        if let Some(generation) = generation {
            info!("Connection monitor started ({})", self.inner.probe.url());
            tokio::spawn(run_schedule(
                Arc::downgrade(&self.inner),
                Arc::clone(&self.inner.wake),
                generation,
            ));
        }
    }

    /// Stop monitoring. The pending timer is cancelled; a probe already in
    /// flight runs to completion but its result is discarded.
    pub fn stop(&self) {
        let stopped = {
            let mut machine = self.inner.machine();
            let was_running = machine.running;
            machine.running = false;
            machine.generation += 1;
            was_running
        };

        if stopped {
            info!("Connection monitor stopped");
            self.inner.wake.notify_waiters();
        }
    }

    /// Clear the failure streak and downtime and re-arm the schedule at the
    /// base interval, without probing. No-op while stopped.
    pub fn reset_retries(&self) {
        let config = &self.inner.config;
        let reset = self.inner.transition(|m| {
            if !m.running {
                return None;
            }
            Some(m.reset_retries(config, Instant::now()))
        });

        if reset.is_some() {
            debug!("Connection retries reset");
            self.inner.wake.notify_waiters();
        }
    }

    /// Probe now, outside the schedule, and restart the schedule timer.
    ///
    /// While stopped this does nothing and returns the last snapshot.
    pub async fn check_connection(&self) -> ConnectionState {
        let generation = {
            let machine = self.inner.machine();
            if !machine.running {
                return machine.state.clone();
            }
            machine.generation
        };

        if self.inner.probe_or_join(generation).await {
            self.inner.wake.notify_waiters();
        }
        self.state()
    }
}
