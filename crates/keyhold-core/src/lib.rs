//! Core library for keyhold.
//!
//! This crate contains the client-side session, access-control and
//! service-credential logic, shared by the `keyhold` CLI and any other
//! front end:
//!
//! - `auth`: session lifecycle, durable token slots and the access gate
//! - `credentials`: per-principal credential records and connection tests
//! - `oauth`: the redirect/callback handshake for linked services
//! - `api`: the REST client for the identity/credential backend
//! - `context`: one client context wiring the above together

pub mod api;
pub mod auth;
pub mod config;
pub mod context;
pub mod credentials;
pub mod error;
pub mod models;
pub mod oauth;
pub mod resolution;
pub mod vault;

pub use api::{ApiClient, ApiError};
pub use auth::{Capability, Decision, DenyReason, SessionData, SessionManager};
pub use config::{Config, TokenStorage};
pub use context::ClientContext;
pub use error::{Error, Result};
pub use models::{
    CredentialRecord, Principal, PrincipalId, Registration, RemoteCredential, Role, SecretPayload,
    ServiceType, TestStatus, Verdict, VerdictStatus,
};
pub use resolution::{AuthState, Resolution};
