//! Trait abstractions for dependency injection and testability.
//!
//! - [`HttpClient`] - HTTP GET/POST against the backend
//! - [`CredentialStore`] - durable session storage

pub mod credentials;
pub mod http;

pub use credentials::CredentialStore;
pub use http::{Headers, HttpClient, HttpError, Response};
