use std::fmt;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::slot::TokenSlot;
use crate::api::TokenPair;
use crate::models::{PrincipalId, Role};

/// Access credential lifetime assumed when the token carries no `exp` claim.
pub const DEFAULT_ACCESS_TOKEN_MINUTES: i64 = 30;

/// Buffer time before expiry to trigger refresh (5 minutes)
const TOKEN_REFRESH_BUFFER_MINUTES: i64 = 5;

/// Claims this client reads from a JWT. Signatures are the backend's
/// business; the client only uses these for scheduling and display.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct Claims {
    #[serde(default)]
    pub exp: Option<i64>,
    #[serde(default)]
    pub sub: Option<serde_json::Value>,
    #[serde(default)]
    pub role: Option<String>,
}

impl Claims {
    /// Decode the payload segment of a JWT; opaque tokens yield `None`.
    pub(crate) fn decode(token: &str) -> Option<Self> {
        let payload = token.split('.').nth(1)?;
        let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
        serde_json::from_slice(&bytes).ok()
    }

    fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.exp.and_then(|exp| DateTime::from_timestamp(exp, 0))
    }

    fn subject(&self) -> Option<PrincipalId> {
        match self.sub.as_ref()? {
            serde_json::Value::Number(n) => n.as_i64(),
            serde_json::Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }
}

/// The active session of one client context.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionData {
    pub access_token: String,
    pub refresh_token: String,
    pub username: String,
    pub principal_id: Option<PrincipalId>,
    /// Fixed for the lifetime of the session once known.
    pub role: Option<Role>,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl fmt::Debug for SessionData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionData")
            .field("username", &self.username)
            .field("principal_id", &self.principal_id)
            .field("role", &self.role)
            .field("issued_at", &self.issued_at)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

impl SessionData {
    /// Build a fresh session from a login response.
    pub fn issue(pair: TokenPair, username: &str, lifetime: Duration) -> Self {
        let claims = Claims::decode(&pair.access_token).unwrap_or_default();
        let issued_at = Utc::now();
        let expires_at = claims
            .expires_at()
            .unwrap_or(issued_at + lifetime)
            .max(issued_at);

        Self {
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
            username: username.to_string(),
            principal_id: claims.subject(),
            role: claims.role.as_deref().map(Role::from_wire),
            issued_at,
            expires_at,
        }
    }

    /// Build the successor of this session from a refresh response.
    /// Identity and role carry over; a token claiming a different role is
    /// reported by `role_conflict`.
    pub fn renew(&self, pair: TokenPair, lifetime: Duration) -> Self {
        let mut next = Self::issue(pair, &self.username, lifetime);
        if next.role.is_some() && self.role.is_some() && next.role != self.role {
            warn!(username = %self.username, "Refreshed token carries a different role");
        }
        next.principal_id = next.principal_id.or(self.principal_id);
        next.role = self.role.or(next.role);
        next
    }

    /// True when the refreshed pair claims a role other than the one this
    /// session was established with.
    pub fn role_conflict(&self, pair: &TokenPair) -> bool {
        let claimed = Claims::decode(&pair.access_token)
            .and_then(|c| c.role)
            .map(|r| Role::from_wire(&r));
        matches!((self.role, claimed), (Some(current), Some(claimed)) if current != claimed)
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }

    /// Check if the session will expire soon and should be refreshed
    pub fn needs_refresh(&self) -> bool {
        let refresh_at = self.expires_at - Duration::minutes(TOKEN_REFRESH_BUFFER_MINUTES);
        Utc::now() > refresh_at
    }

    /// True when the refresh credential itself is known to be expired.
    pub fn refresh_expired(&self) -> bool {
        Claims::decode(&self.refresh_token)
            .and_then(|c| c.expires_at())
            .map(|exp| Utc::now() >= exp)
            .unwrap_or(false)
    }

    pub fn time_until_expiry(&self) -> Duration {
        self.expires_at - Utc::now()
    }

    /// Get minutes remaining until expiry (for display)
    pub fn minutes_until_expiry(&self) -> i64 {
        self.time_until_expiry().num_minutes().max(0)
    }
}

/// Holder of the current session, backed by a durable token slot.
pub struct Session {
    slot: Box<dyn TokenSlot>,
    pub data: Option<SessionData>,
}

impl Session {
    pub fn new(slot: Box<dyn TokenSlot>) -> Self {
        Self { slot, data: None }
    }

    /// Load the persisted session. A session whose refresh credential has
    /// expired is discarded and the slot purged.
    pub fn load(&mut self) -> anyhow::Result<bool> {
        match self.slot.load()? {
            Some(data) if data.refresh_expired() => {
                self.slot.clear()?;
                Ok(false)
            }
            Some(data) => {
                self.data = Some(data);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Persist the current session
    pub fn save(&self) -> anyhow::Result<()> {
        if let Some(ref data) = self.data {
            self.slot.store(data)?;
        }
        Ok(())
    }

    /// Clear session data, in memory first so a failing slot still ends
    /// the session locally.
    pub fn clear(&mut self) -> anyhow::Result<()> {
        self.data = None;
        self.slot.clear()
    }

    /// Update session with new data
    pub fn update(&mut self, data: SessionData) {
        self.data = Some(data);
    }

    /// Get the bearer token if a session exists
    pub fn token(&self) -> Option<&str> {
        self.data.as_ref().map(|d| d.access_token.as_str())
    }
}

/// Build an unsigned JWT-shaped token carrying the given claims.
#[cfg(test)]
pub(crate) fn test_token(exp: DateTime<Utc>, sub: PrincipalId, role: &str) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
    let payload = serde_json::json!({ "exp": exp.timestamp(), "sub": sub, "role": role });
    let payload = URL_SAFE_NO_PAD.encode(payload.to_string());
    format!("{}.{}.sig", header, payload)
}
