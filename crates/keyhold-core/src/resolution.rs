//! Published state of asynchronous operations.

use crate::error::Error;
use crate::models::Principal;

/// Outcome of an operation as seen by a subscriber.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution<T> {
    /// No result yet.
    Pending,
    Resolved(T),
    Failed(Error),
}

impl<T> Resolution<T> {
    pub fn is_pending(&self) -> bool {
        matches!(self, Resolution::Pending)
    }
}

impl<T> From<Result<T, Error>> for Resolution<T> {
    fn from(result: Result<T, Error>) -> Self {
        match result {
            Ok(value) => Resolution::Resolved(value),
            Err(err) => Resolution::Failed(err),
        }
    }
}

/// Authentication state of a client context.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthState {
    Anonymous,
    Authenticated(Principal),
}
