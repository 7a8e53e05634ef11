//! Access control decisions. Pure functions over the session snapshot.

use std::fmt;
use std::str::FromStr;

use super::session::SessionData;
use crate::error::{Error, Result};
use crate::models::Role;

/// Permission level a caller asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Member,
    Admin,
}

impl FromStr for Capability {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "member" | "user" => Ok(Capability::Member),
            "admin" => Ok(Capability::Admin),
            other => Err(format!("unknown capability '{}'", other)),
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Capability::Member => "member",
            Capability::Admin => "admin",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    NotAuthenticated,
    InsufficientRole,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(DenyReason),
}

pub fn authorize(capability: Capability, session: Option<&SessionData>) -> Decision {
    let session = match session {
        Some(s) if !s.is_expired() => s,
        _ => return Decision::Deny(DenyReason::NotAuthenticated),
    };

    match (capability, session.role) {
        (Capability::Member, Some(_)) => Decision::Allow,
        (Capability::Admin, Some(Role::Admin)) => Decision::Allow,
        // Role not yet resolved, or member asking for admin.
        _ => Decision::Deny(DenyReason::InsufficientRole),
    }
}

/// `authorize`, with a deny turned into the matching error.
pub fn require(capability: Capability, session: Option<&SessionData>) -> Result<()> {
    match authorize(capability, session) {
        Decision::Allow => Ok(()),
        Decision::Deny(DenyReason::NotAuthenticated) => Err(Error::NotAuthenticated),
        Decision::Deny(DenyReason::InsufficientRole) => Err(Error::InsufficientRole),
    }
}
