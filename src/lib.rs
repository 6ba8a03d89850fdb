//! linkwatch - connection-health monitor and credential-lifecycle manager
//!
//! Background services for an administration console client:
//! [`health::ConnectionMonitor`] tracks whether the backend is reachable,
//! [`auth::TokenManager`] keeps the session's access token valid.
//!
//! This library exposes modules for use in integration tests.

pub mod adapters;
pub mod auth;
pub mod config;
pub mod error;
pub mod events;
pub mod health;
pub mod traits;
