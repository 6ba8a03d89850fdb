//! Integration tests for the connection state machine.
//!
//! All tests run on a paused clock: probe latency comes from the mock's
//! scripted delay and the schedule advances only when the runtime is idle,
//! so intervals are asserted exactly.

mod common;

use common::*;
use linkwatch::error::ConnectionError;
use linkwatch::health::ConnectionStatus;
use std::time::Duration;

fn secs(s: u64) -> Duration {
    Duration::from_secs(s)
}

// ============================================================================
// Classification
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_fast_first_probe_is_healthy() {
    let mut h = MonitorHarness::new(fast_monitor_config());
    h.http.set_response(
        HEALTH_URL,
        MockResponse::json(200, healthy_body()).after(Duration::from_millis(40)),
    );
    h.start();

    let initial = h.next_state().await;
    assert_eq!(initial.status, ConnectionStatus::Checking);
    assert!(!initial.is_connected());

    let (state, _) = h.next_outcome().await;
    assert_eq!(state.status, ConnectionStatus::Healthy);
    assert_eq!(state.downtime, Duration::ZERO);
    assert_eq!(state.retry_count, 0);
    assert_eq!(state.latency, Some(Duration::from_millis(40)));
    assert!(state.last_successful_connection.is_some());
    assert!(state.is_connected());
}

#[tokio::test(start_paused = true)]
async fn test_three_failures_reach_down_on_the_third() {
    let mut h = MonitorHarness::new(fast_monitor_config());
    h.http.set_response(HEALTH_URL, MockResponse::refused());
    h.start();

    let (first, _) = h.next_outcome().await;
    let (second, _) = h.next_outcome().await;
    let (third, _) = h.next_outcome().await;

    assert_eq!(first.status, ConnectionStatus::Degraded);
    assert_eq!(second.status, ConnectionStatus::Degraded);
    assert_eq!(third.status, ConnectionStatus::Down);
    assert_eq!(third.retry_count, 3);
    assert!(matches!(third.error, Some(ConnectionError::Network { .. })));
    assert!(!third.is_connected());
}

#[tokio::test(start_paused = true)]
async fn test_slow_success_is_degraded() {
    let mut h = MonitorHarness::new(fast_monitor_config());
    h.http.set_response(
        HEALTH_URL,
        MockResponse::json(200, healthy_body()).after(Duration::from_millis(1500)),
    );
    h.start();

    let (state, _) = h.next_outcome().await;
    assert_eq!(state.status, ConnectionStatus::Degraded);
    assert_eq!(state.retry_count, 0);
    assert!(state.error.is_none());
    assert!(state.is_connected());
}

#[tokio::test(start_paused = true)]
async fn test_probe_timeout_counts_as_failure() {
    let mut h = MonitorHarness::new(fast_monitor_config().with_probe_timeout(secs(2)));
    h.http.set_response(HEALTH_URL, MockResponse::Hang);
    h.start();

    let (state, elapsed) = h.next_outcome().await;
    assert_eq!(state.status, ConnectionStatus::Degraded);
    assert_eq!(state.retry_count, 1);
    assert_eq!(state.error, Some(ConnectionError::Timeout { after: secs(2) }));
    assert_eq!(elapsed, secs(2));
}

#[tokio::test(start_paused = true)]
async fn test_server_error_is_failure() {
    let mut h = MonitorHarness::new(fast_monitor_config());
    h.http.set_response(HEALTH_URL, MockResponse::status(503));
    h.start();

    let (state, _) = h.next_outcome().await;
    assert_eq!(state.status, ConnectionStatus::Degraded);
    assert_eq!(state.error.and_then(|e| e.status()), Some(503));
}

// ============================================================================
// Counters and schedule
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_retry_count_and_downtime_over_a_streak() {
    let mut h = MonitorHarness::new(fast_monitor_config());
    for _ in 0..4 {
        h.http.push_response(
            HEALTH_URL,
            MockResponse::refused().after(Duration::from_millis(250)),
        );
    }
    h.http
        .set_response(HEALTH_URL, MockResponse::json(200, healthy_body()));
    h.start();

    let mut retries = Vec::new();
    let mut downtimes = Vec::new();
    for _ in 0..4 {
        let (state, _) = h.next_outcome().await;
        retries.push(state.retry_count);
        downtimes.push(state.downtime);
    }
    assert_eq!(retries, vec![1, 2, 3, 4]);
    assert!(downtimes.windows(2).all(|w| w[0] < w[1]), "{:?}", downtimes);

    let (recovered, _) = h.next_outcome().await;
    assert_eq!(recovered.status, ConnectionStatus::Healthy);
    assert_eq!(recovered.retry_count, 0);
    assert_eq!(recovered.downtime, Duration::ZERO);
    assert_eq!(recovered.next_interval, secs(10));
}

#[tokio::test(start_paused = true)]
async fn test_down_stays_down_while_probing() {
    let mut h = MonitorHarness::new(fast_monitor_config());
    h.http.set_response(HEALTH_URL, MockResponse::refused());
    h.start();

    for _ in 0..3 {
        h.next_outcome().await;
    }
    // After Down, the next state is the next result, not Checking.
    let state = h.next_state().await;
    assert_eq!(state.status, ConnectionStatus::Down);
    assert_eq!(state.retry_count, 4);
}

#[tokio::test(start_paused = true)]
async fn test_downtime_only_reported_while_failing() {
    let mut h = MonitorHarness::new(fast_monitor_config());
    h.http.push_response(HEALTH_URL, MockResponse::refused());
    h.http.push_response(HEALTH_URL, MockResponse::refused());
    h.http
        .set_response(HEALTH_URL, MockResponse::json(200, healthy_body()));
    h.start();

    let mut states = vec![h.next_state().await];
    while states.last().map(|s| s.status) != Some(ConnectionStatus::Healthy) {
        states.push(h.next_state().await);
    }

    let statuses: Vec<_> = states.iter().map(|s| s.status).collect();
    assert_eq!(
        statuses,
        vec![
            ConnectionStatus::Checking,
            ConnectionStatus::Degraded,
            ConnectionStatus::Degraded,
            ConnectionStatus::Healthy,
        ]
    );
    for state in &states {
        if state.downtime > Duration::ZERO {
            assert!(
                matches!(
                    state.status,
                    ConnectionStatus::Degraded | ConnectionStatus::Down
                ),
                "{:?}",
                state
            );
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_backoff_grows_to_ceiling() {
    let mut h = MonitorHarness::new(fast_monitor_config());
    h.http.set_response(HEALTH_URL, MockResponse::refused());
    h.start();

    let mut times = Vec::new();
    for _ in 0..6 {
        let (state, at) = h.next_outcome().await;
        assert!(state.next_interval <= secs(60));
        times.push(at);
    }

    let gaps: Vec<u64> = times.windows(2).map(|w| (w[1] - w[0]).as_secs()).collect();
    assert_eq!(gaps, vec![20, 40, 60, 60, 60]);
}

#[tokio::test(start_paused = true)]
async fn test_zero_interval_does_not_spin() {
    let mut config = fast_monitor_config();
    config.base_interval = Duration::ZERO;
    let mut h = MonitorHarness::new(config);
    h.http
        .set_response(HEALTH_URL, MockResponse::json(200, healthy_body()));
    h.start();

    let (first, t1) = h.next_outcome().await;
    let (_, t2) = h.next_outcome().await;
    assert_eq!(first.next_interval, secs(1));
    assert_eq!(t2 - t1, secs(1));
}

#[tokio::test(start_paused = true)]
async fn test_success_resets_interval_to_base() {
    let mut h = MonitorHarness::new(fast_monitor_config());
    h.http.push_response(HEALTH_URL, MockResponse::refused());
    h.http.push_response(HEALTH_URL, MockResponse::refused());
    h.http
        .set_response(HEALTH_URL, MockResponse::json(200, healthy_body()));
    h.start();

    let (_, t1) = h.next_outcome().await;
    let (_, t2) = h.next_outcome().await;
    let (ok, t3) = h.next_outcome().await;
    let (_, t4) = h.next_outcome().await;

    assert_eq!(t2 - t1, secs(20));
    assert_eq!(t3 - t2, secs(40));
    assert_eq!(ok.status, ConnectionStatus::Healthy);
    assert_eq!(t4 - t3, secs(10));
}

// ============================================================================
// Lifecycle
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_stop_discards_in_flight_result() {
    let mut h = MonitorHarness::new(fast_monitor_config());
    h.http.set_response(
        HEALTH_URL,
        MockResponse::json(200, healthy_body()).after(secs(1)),
    );
    h.start();
    assert_eq!(h.next_state().await.status, ConnectionStatus::Checking);

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(h.probes(), 1);
    h.monitor.stop();
    assert!(!h.monitor.is_running());

    tokio::time::sleep(secs(120)).await;
    assert!(h.states.try_recv().is_err());
    assert_eq!(h.monitor.state().status, ConnectionStatus::Checking);
    assert_eq!(h.probes(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_restart_after_stop() {
    let mut h = MonitorHarness::new(fast_monitor_config());
    h.http
        .set_response(HEALTH_URL, MockResponse::json(200, healthy_body()));
    h.start();
    h.next_outcome().await;

    h.monitor.stop();
    h.start();
    assert!(h.monitor.is_running());

    let restarted = h.next_state().await;
    assert_eq!(restarted.status, ConnectionStatus::Checking);
    assert_eq!(restarted.retry_count, 0);

    let (state, at) = h.next_outcome().await;
    assert_eq!(state.status, ConnectionStatus::Healthy);
    assert_eq!(at, Duration::ZERO);
    assert_eq!(h.probes(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_start_twice_is_noop() {
    let mut h = MonitorHarness::new(fast_monitor_config());
    h.http
        .set_response(HEALTH_URL, MockResponse::json(200, healthy_body()));
    h.start();
    h.monitor.start();

    h.next_outcome().await;
    tokio::time::sleep(Duration::from_millis(1)).await;
    assert_eq!(h.probes(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_dropping_monitor_ends_loop() {
    let mut h = MonitorHarness::new(fast_monitor_config());
    h.http
        .set_response(HEALTH_URL, MockResponse::json(200, healthy_body()));
    h.start();
    h.next_outcome().await;

    let http = h.http.clone();
    drop(h);

    tokio::time::sleep(secs(600)).await;
    assert_eq!(http.request_count(HEALTH_URL), 1);
}

// ============================================================================
// On-demand operations
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_check_connection_rearms_schedule() {
    let mut h = MonitorHarness::new(fast_monitor_config());
    h.http
        .set_response(HEALTH_URL, MockResponse::json(200, healthy_body()));
    h.start();
    h.next_outcome().await;

    tokio::time::sleep(secs(5)).await;
    let state = h.monitor.check_connection().await;
    assert_eq!(state.status, ConnectionStatus::Healthy);
    assert_eq!(h.probes(), 2);

    // The on-demand probe published its own Checking -> Healthy pair.
    let (on_demand, at) = h.next_outcome().await;
    assert_eq!(on_demand, state);
    assert_eq!(at, secs(5));

    let (_, next) = h.next_outcome().await;
    assert_eq!(next, secs(15));
}

#[tokio::test(start_paused = true)]
async fn test_check_connection_joins_in_flight_probe() {
    let mut h = MonitorHarness::new(fast_monitor_config());
    h.http.set_response(
        HEALTH_URL,
        MockResponse::json(200, healthy_body()).after(secs(2)),
    );
    h.start();

    let (a, b) = tokio::join!(h.monitor.check_connection(), h.monitor.check_connection());
    assert_eq!(a.status, ConnectionStatus::Healthy);
    assert_eq!(a, b);
    assert_eq!(h.probes(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_check_connection_while_stopped_does_not_probe() {
    let h = MonitorHarness::new(fast_monitor_config());
    h.http
        .set_response(HEALTH_URL, MockResponse::json(200, healthy_body()));

    let state = h.monitor.check_connection().await;
    assert_eq!(state.status, ConnectionStatus::Checking);
    assert_eq!(h.probes(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_reset_retries_clears_streak_without_probing() {
    let mut h = MonitorHarness::new(fast_monitor_config());
    h.http.set_response(HEALTH_URL, MockResponse::refused());
    h.start();

    h.next_outcome().await;
    let (second, t2) = h.next_outcome().await;
    assert_eq!(second.retry_count, 2);
    assert_eq!(second.next_interval, secs(40));

    h.monitor.reset_retries();
    let reset = h.next_state().await;
    assert_eq!(reset.retry_count, 0);
    assert_eq!(reset.downtime, Duration::ZERO);
    assert_eq!(reset.next_interval, secs(10));
    assert_eq!(h.probes(), 2);

    let (after, t3) = h.next_outcome().await;
    assert_eq!(t3 - t2, secs(10));
    assert_eq!(after.retry_count, 1);
    assert_eq!(after.downtime, secs(10));
}

#[tokio::test(start_paused = true)]
async fn test_every_subscriber_sees_every_state() {
    let mut h = MonitorHarness::new(fast_monitor_config());
    h.http.push_response(HEALTH_URL, MockResponse::refused());
    h.http
        .set_response(HEALTH_URL, MockResponse::json(200, healthy_body()));
    let (mut second, _sub) = h.monitor.subscribe_channel();
    h.start();

    let mut seen_first = Vec::new();
    for _ in 0..5 {
        seen_first.push(h.next_state().await.status);
    }
    let mut seen_second = Vec::new();
    for _ in 0..5 {
        seen_second.push(second.recv().await.unwrap().status);
    }

    let expected = vec![
        ConnectionStatus::Checking,
        ConnectionStatus::Degraded,
        ConnectionStatus::Healthy,
        ConnectionStatus::Checking,
        ConnectionStatus::Healthy,
    ];
    assert_eq!(seen_first, expected);
    assert_eq!(seen_second, expected);
}
