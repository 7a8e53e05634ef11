//! Data models for keyhold entities.
//!
//! - `Principal`, `Role`, `Registration`: user identity and signup data
//! - `ServiceType`, `CredentialRecord`, `SecretPayload`: per-service credentials
//! - `TestStatus`, `Verdict`: connection verification outcomes

pub mod credential;
pub mod principal;

pub use credential::{
    CredentialRecord, RemoteCredential, SecretPayload, ServiceType, TestStatus, Verdict,
    VerdictStatus,
};
pub use principal::{Principal, PrincipalId, Registration, Role};

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer};

/// Deserialize an optional timestamp that may or may not carry a UTC offset.
/// The backend emits naive UTC timestamps (`2024-05-01T12:00:00.123456`).
pub(crate) fn lenient_datetime<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.as_deref().and_then(parse_timestamp))
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}
