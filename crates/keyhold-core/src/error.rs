//! Error taxonomy surfaced to callers of the core.

use thiserror::Error;

use crate::api::ApiError;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Insufficient role for this action")]
    InsufficientRole,

    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("Rate limited - please wait before retrying")]
    RateLimited,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Username or email already registered")]
    DuplicateUsername,

    #[error("No credentials configured for {0}")]
    NotConfigured(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("OAuth error: {0}")]
    OAuthError(String),

    #[error("Storage error: {0}")]
    StorageError(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<ApiError> for Error {
    /// Generic mapping; call sites with more context (login, signup) map
    /// the ambiguous statuses themselves before falling back to this.
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Unauthorized => Error::NotAuthenticated,
            ApiError::AccessDenied(_) => Error::InsufficientRole,
            ApiError::RateLimited => Error::RateLimited,
            ApiError::BadRequest(detail) | ApiError::Unprocessable(detail) => {
                Error::ValidationError(detail)
            }
            other => Error::NetworkError(other.to_string()),
        }
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::StorageError(format!("{:#}", err))
    }
}
