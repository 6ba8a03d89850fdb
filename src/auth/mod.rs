//! Authentication module for linkwatch.
//!
//! This module provides:
//! - Session credentials and token grants
//! - The refresh endpoint client
//! - The token lifecycle manager (single-flight and proactive refresh)

pub mod credentials;
pub mod refresh;
pub mod token_manager;

pub use credentials::{jwt_lifetime, Credentials, TokenGrant, UserProfile};
pub use refresh::RefreshClient;
pub use token_manager::TokenManager;
