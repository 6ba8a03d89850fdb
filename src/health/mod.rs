//! Backend health monitoring.
//!
//! - [`HealthCheckProbe`] - one bounded GET against the health endpoint
//! - [`ConnectionMonitor`] - schedules probes and classifies the backend
//! - [`ConnectionState`] - the snapshot published on every transition

pub mod monitor;
pub mod probe;
pub mod state;

pub use monitor::ConnectionMonitor;
pub use probe::{HealthCheckProbe, ProbeSuccess};
pub use state::{ConnectionState, ConnectionStatus};
