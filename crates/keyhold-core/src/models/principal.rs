use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Maximum length for usernames.
pub const MAX_USERNAME_LENGTH: usize = 50;

/// Maximum length for passwords.
/// 128 chars accommodates password managers and passphrases.
pub const MAX_PASSWORD_LENGTH: usize = 128;

pub type PrincipalId = i64;

/// Role of a principal. The backend calls the member role `"user"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Member,
    Admin,
}

impl Role {
    /// Parse a role string from the backend. Anything that is not
    /// exactly `admin` is treated as a member.
    pub fn from_wire(s: &str) -> Self {
        if s.trim().eq_ignore_ascii_case("admin") {
            Role::Admin
        } else {
            Role::Member
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Member => "member",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Role {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Role::from_wire(&raw))
    }
}

fn default_active() -> bool {
    true
}

/// An authenticated user identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
pub struct Principal {
    pub id: PrincipalId,
    pub username: String,
    #[serde(default, rename = "full_name", alias = "display_name")]
    pub display_name: Option<String>,
    pub email: String,
    pub role: Role,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default, deserialize_with = "super::lenient_datetime")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Principal {
    /// Name suitable for display: the full name if set, otherwise the username.
    pub fn display(&self) -> &str {
        self.display_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(&self.username)
    }
}

/// Data submitted to create a new principal.
#[derive(Clone, Serialize)]
pub struct Registration {
    pub username: String,
    pub email: String,
    #[serde(rename = "full_name", skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub password: String,
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("username", &self.username)
            .field("email", &self.email)
            .field("display_name", &self.display_name)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl Registration {
    /// Check the registration locally before it is sent anywhere.
    pub fn validate(&self) -> Result<(), String> {
        validate_username(&self.username)?;
        validate_password(&self.password)?;
        validate_email(&self.email)
    }
}

fn is_valid_input_char(c: char) -> bool {
    !c.is_control()
}

pub fn validate_username(username: &str) -> Result<(), String> {
    if username.trim().is_empty() {
        return Err("username is required".to_string());
    }
    if username.chars().count() > MAX_USERNAME_LENGTH {
        return Err(format!(
            "username must be at most {} characters",
            MAX_USERNAME_LENGTH
        ));
    }
    if !username.chars().all(is_valid_input_char) {
        return Err("username contains control characters".to_string());
    }
    Ok(())
}

pub fn validate_password(password: &str) -> Result<(), String> {
    if password.is_empty() {
        return Err("password is required".to_string());
    }
    if password.chars().count() > MAX_PASSWORD_LENGTH {
        return Err(format!(
            "password must be at most {} characters",
            MAX_PASSWORD_LENGTH
        ));
    }
    if !password.chars().all(is_valid_input_char) {
        return Err("password contains control characters".to_string());
    }
    Ok(())
}

fn validate_email(email: &str) -> Result<(), String> {
    let mut parts = email.trim().split('@');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(local), Some(domain), None) if !local.is_empty() && !domain.is_empty() => Ok(()),
        _ => Err(format!("'{}' is not a valid email address", email)),
    }
}
