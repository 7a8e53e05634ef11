//! REST client for the identity/credential backend.
//!
//! This module provides the `ApiClient` for the backend's auth, credential
//! and OAuth endpoints. Requests made on behalf of a session carry the
//! access credential as a bearer token.

pub mod client;
pub mod error;

pub use client::{ApiClient, AuthorizationGrant, RemoteVerdict, TokenPair};
pub use error::ApiError;
