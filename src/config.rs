//! Configuration for the connection monitor and the token manager.
//!
//! Every knob has a default. Use the builder methods to customize, or
//! [`Settings::from_env`] to read overrides from `LINKWATCH_*` variables.
//!
//! ```ignore
//! use linkwatch::config::MonitorConfig;
//! use std::time::Duration;
//!
//! let config = MonitorConfig::new("https://admin.example.com")
//!     .with_base_interval(Duration::from_secs(10))
//!     .with_down_threshold(5);
//! ```

use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;

/// Default health endpoint path.
pub const DEFAULT_HEALTH_PATH: &str = "/api/health";

/// Default refresh endpoint path.
pub const DEFAULT_REFRESH_PATH: &str = "/api/auth/refresh";

/// Default API base URL, used when nothing is configured.
pub const DEFAULT_API_URL: &str = "http://localhost:8080";

/// Shortest interval between scheduled probes.
pub const MIN_PROBE_INTERVAL: Duration = Duration::from_secs(1);

/// Directory under the home directory holding persisted credentials.
const CREDENTIALS_DIR: &str = ".linkwatch";

/// Health monitor configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorConfig {
    /// Full URL of the health endpoint.
    pub health_url: String,
    /// Probe interval while healthy, and the interval any success resets to.
    pub base_interval: Duration,
    /// Factor applied to the interval after each failure.
    pub backoff_multiplier: f64,
    /// Ceiling for the backed-off interval.
    pub max_interval: Duration,
    /// Latency at or above which a successful probe counts as degraded.
    pub degraded_latency: Duration,
    /// Consecutive failures after which the backend is considered down.
    pub down_threshold: u32,
    /// Bound on a single probe request.
    pub probe_timeout: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self::new(DEFAULT_API_URL)
    }
}

impl MonitorConfig {
    /// Configuration probing `{api_url}/api/health` with default timings.
    pub fn new(api_url: &str) -> Self {
        Self {
            health_url: join_url(api_url, DEFAULT_HEALTH_PATH),
            base_interval: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            max_interval: Duration::from_secs(300),
            degraded_latency: Duration::from_millis(1000),
            down_threshold: 3,
            probe_timeout: Duration::from_secs(5),
        }
    }

    pub fn with_health_url(mut self, url: impl Into<String>) -> Self {
        self.health_url = url.into();
        self
    }

    /// Clamped to at least [`MIN_PROBE_INTERVAL`].
    pub fn with_base_interval(mut self, interval: Duration) -> Self {
        self.base_interval = interval.max(MIN_PROBE_INTERVAL);
        self
    }

    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    pub fn with_max_interval(mut self, interval: Duration) -> Self {
        self.max_interval = interval;
        self
    }

    pub fn with_degraded_latency(mut self, latency: Duration) -> Self {
        self.degraded_latency = latency;
        self
    }

    pub fn with_down_threshold(mut self, threshold: u32) -> Self {
        self.down_threshold = threshold;
        self
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// Interval between probes while healthy.
    ///
    /// `base_interval` floored at [`MIN_PROBE_INTERVAL`].
    pub fn probe_interval(&self) -> Duration {
        self.base_interval.max(MIN_PROBE_INTERVAL)
    }

    /// Interval to wait after a failure, given the current one.
    ///
    /// Never exceeds `max_interval` and never drops below
    /// [`probe_interval`](Self::probe_interval).
    pub fn next_backoff(&self, current: Duration) -> Duration {
        let multiplier = if self.backoff_multiplier.is_finite() && self.backoff_multiplier >= 1.0 {
            self.backoff_multiplier
        } else {
            1.0
        };
        let floor = self.probe_interval();
        let next = current.as_secs_f64() * multiplier;
        let ceiling = self.max_interval.max(floor);
        if next >= ceiling.as_secs_f64() {
            ceiling
        } else {
            Duration::from_secs_f64(next).max(floor)
        }
    }
}

/// Token manager configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenConfig {
    /// Full URL of the refresh endpoint.
    pub refresh_url: String,
    /// Margin before expiry at which a token is renewed.
    pub refresh_skew: Duration,
    /// Bound on a single refresh request.
    pub refresh_timeout: Duration,
    /// Lifetime assumed when the server declares none.
    pub default_lifetime: Duration,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self::new(DEFAULT_API_URL)
    }
}

impl TokenConfig {
    pub fn new(api_url: &str) -> Self {
        Self {
            refresh_url: join_url(api_url, DEFAULT_REFRESH_PATH),
            refresh_skew: Duration::from_secs(30),
            refresh_timeout: Duration::from_secs(10),
            default_lifetime: Duration::from_secs(15 * 60),
        }
    }

    pub fn with_refresh_url(mut self, url: impl Into<String>) -> Self {
        self.refresh_url = url.into();
        self
    }

    pub fn with_refresh_skew(mut self, skew: Duration) -> Self {
        self.refresh_skew = skew;
        self
    }

    pub fn with_refresh_timeout(mut self, timeout: Duration) -> Self {
        self.refresh_timeout = timeout;
        self
    }

    pub fn with_default_lifetime(mut self, lifetime: Duration) -> Self {
        self.default_lifetime = lifetime;
        self
    }
}

/// Everything the composition root needs.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub api_url: String,
    pub monitor: MonitorConfig,
    pub token: TokenConfig,
    /// Directory for the credential file; None when no home directory exists.
    pub credentials_dir: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            monitor: MonitorConfig::default(),
            token: TokenConfig::default(),
            credentials_dir: dirs::home_dir().map(|home| home.join(CREDENTIALS_DIR)),
        }
    }
}

impl Settings {
    /// Read settings from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Settings::default();

        if let Some(url) = lookup("LINKWATCH_API_URL") {
            let url = url.trim_end_matches('/').to_string();
            settings.monitor = MonitorConfig::new(&url);
            settings.token = TokenConfig::new(&url);
            settings.api_url = url;
        }
        if let Some(path) = lookup("LINKWATCH_HEALTH_PATH") {
            settings.monitor.health_url = join_url(&settings.api_url, &path);
        }
        if let Some(path) = lookup("LINKWATCH_REFRESH_PATH") {
            settings.token.refresh_url = join_url(&settings.api_url, &path);
        }
        if let Some(secs) = parse_var::<u64>(&lookup, "LINKWATCH_PROBE_INTERVAL_SECS") {
            settings.monitor.base_interval = Duration::from_secs(secs).max(MIN_PROBE_INTERVAL);
        }
        if let Some(ms) = parse_var::<u64>(&lookup, "LINKWATCH_DEGRADED_LATENCY_MS") {
            settings.monitor.degraded_latency = Duration::from_millis(ms);
        }
        if let Some(threshold) = parse_var::<u32>(&lookup, "LINKWATCH_DOWN_THRESHOLD") {
            settings.monitor.down_threshold = threshold.max(1);
        }
        if let Some(secs) = parse_var::<u64>(&lookup, "LINKWATCH_REFRESH_SKEW_SECS") {
            settings.token.refresh_skew = Duration::from_secs(secs);
        }
        if let Some(dir) = lookup("LINKWATCH_CREDENTIALS_DIR") {
            settings.credentials_dir = Some(PathBuf::from(dir));
        }

        settings
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Ignoring {}={:?}: not a valid number", key, raw);
            None
        }
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
