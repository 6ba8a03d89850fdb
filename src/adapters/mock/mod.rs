//! Test doubles for the trait seams.
//!
//! - [`MockHttpClient`] - scripted HTTP responses with optional latency
//! - [`InMemoryCredentialStore`] - credential storage with failure injection

pub mod credentials;
pub mod http;

pub use credentials::InMemoryCredentialStore;
pub use http::{MockHttpClient, MockResponse, RecordedRequest};
