use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use super::PrincipalId;

/// Third-party service a credential record belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ServiceType {
    /// Chat workspace the bot posts into (Slack).
    MessagePlatform,
    /// Hosted model deployment (Azure OpenAI).
    InferenceProvider,
    /// Document storage reached through a linked OAuth grant (Google Workspace).
    DocumentStore,
    /// OAuth client registration used to link the document store.
    OAuthClient,
    /// Any other service; verified by the backend.
    Other(String),
}

impl ServiceType {
    /// Wire name used by the backend.
    pub fn as_str(&self) -> &str {
        match self {
            ServiceType::MessagePlatform => "slack",
            ServiceType::InferenceProvider => "azure_openai",
            ServiceType::DocumentStore => "google_workspace",
            ServiceType::OAuthClient => "google_oauth",
            ServiceType::Other(name) => name,
        }
    }

    /// Human-readable label.
    pub fn label(&self) -> &str {
        match self {
            ServiceType::MessagePlatform => "Slack",
            ServiceType::InferenceProvider => "Azure OpenAI",
            ServiceType::DocumentStore => "Google Workspace",
            ServiceType::OAuthClient => "Google OAuth client",
            ServiceType::Other(name) => name,
        }
    }

    /// Field groups a payload must carry; each group is satisfied by any one
    /// of its names holding a non-empty string.
    fn required_fields(&self) -> &'static [&'static [&'static str]] {
        match self {
            ServiceType::MessagePlatform => &[&["bot_token", "token"]],
            ServiceType::InferenceProvider => &[&["endpoint"], &["api_key"], &["deployment"]],
            ServiceType::DocumentStore => &[&["token", "access_token"]],
            ServiceType::OAuthClient => &[&["client_id"], &["client_secret"]],
            ServiceType::Other(_) => &[],
        }
    }

    /// Check that a payload has the shape this service needs.
    pub fn validate_payload(&self, payload: &SecretPayload) -> Result<(), String> {
        if payload.is_empty() {
            return Err(format!("{} credentials must not be empty", self.label()));
        }
        for group in self.required_fields() {
            if !group.iter().any(|name| payload.field(name).is_some()) {
                return Err(format!(
                    "{} credentials require '{}'",
                    self.label(),
                    group.join("' or '")
                ));
            }
        }
        Ok(())
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_ascii_lowercase();
        match name.as_str() {
            "slack" | "message-platform" | "message_platform" => Ok(ServiceType::MessagePlatform),
            "azure_openai" | "inference-provider" | "inference_provider" => {
                Ok(ServiceType::InferenceProvider)
            }
            "google_workspace" | "document-store" | "document_store" => {
                Ok(ServiceType::DocumentStore)
            }
            "google_oauth" | "oauth-client" | "oauth_client" => Ok(ServiceType::OAuthClient),
            "" => Err("service type is required".to_string()),
            other => {
                if other
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
                {
                    Ok(ServiceType::Other(other.to_string()))
                } else {
                    Err(format!("'{}' is not a valid service type", s))
                }
            }
        }
    }
}

impl Serialize for ServiceType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ServiceType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Opaque secret payload. Never printed by `Debug`.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SecretPayload(Map<String, Value>);

impl SecretPayload {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// Build a payload from arbitrary JSON; only objects are accepted.
    pub fn from_value(value: Value) -> Result<Self, String> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(format!("credentials must be a JSON object, got {}", kind_of(&other))),
        }
    }

    /// Non-empty string field, if present.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.0
            .get(name)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

impl fmt::Debug for SecretPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.keys()).finish()
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Verification state of a credential record.
///
/// `NotConfigured` is never stored; it is what callers see when no record
/// exists for a service type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[serde(rename_all = "snake_case")]
pub enum TestStatus {
    NotConfigured,
    Pending,
    Success,
    Failed,
}

impl TestStatus {
    pub fn of(record: Option<&CredentialRecord>) -> Self {
        record.map(|r| r.test_status).unwrap_or(TestStatus::NotConfigured)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TestStatus::NotConfigured => "not_configured",
            TestStatus::Pending => "pending",
            TestStatus::Success => "success",
            TestStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stored configuration and verification status for one service integration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialRecord {
    pub owner: PrincipalId,
    pub service_type: ServiceType,
    pub payload: SecretPayload,
    pub test_status: TestStatus,
    pub last_tested_at: Option<DateTime<Utc>>,
    pub test_message: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[serde(rename_all = "lowercase")]
pub enum VerdictStatus {
    Success,
    Failed,
}

/// Outcome of a single connection test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
pub struct Verdict {
    pub status: VerdictStatus,
    pub message: String,
    pub tested_at: DateTime<Utc>,
}

impl Verdict {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: VerdictStatus::Success,
            message: message.into(),
            tested_at: Utc::now(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: VerdictStatus::Failed,
            message: message.into(),
            tested_at: Utc::now(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == VerdictStatus::Success
    }

    pub fn test_status(&self) -> TestStatus {
        match self.status {
            VerdictStatus::Success => TestStatus::Success,
            VerdictStatus::Failed => TestStatus::Failed,
        }
    }
}

/// Credential metadata as the backend reports it. Secrets are never returned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteCredential {
    pub id: i64,
    pub service_type: ServiceType,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default, deserialize_with = "super::lenient_datetime")]
    pub last_tested_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub test_status: Option<String>,
    #[serde(default)]
    pub test_message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(value: Value) -> SecretPayload {
        SecretPayload::from_value(value).unwrap()
    }

    #[test]
    fn test_service_type_parses_wire_names_and_aliases() {
        assert_eq!("slack".parse::<ServiceType>().unwrap(), ServiceType::MessagePlatform);
        assert_eq!(
            "message-platform".parse::<ServiceType>().unwrap(),
            ServiceType::MessagePlatform
        );
        assert_eq!(
            "inference-provider".parse::<ServiceType>().unwrap(),
            ServiceType::InferenceProvider
        );
        assert_eq!(
            "Google_Workspace".parse::<ServiceType>().unwrap(),
            ServiceType::DocumentStore
        );
        assert_eq!(
            "notion".parse::<ServiceType>().unwrap(),
            ServiceType::Other("notion".to_string())
        );
        assert!("".parse::<ServiceType>().is_err());
        assert!("../etc".parse::<ServiceType>().is_err());
    }

    #[test]
    fn test_service_type_serializes_as_wire_name() {
        let json = serde_json::to_string(&ServiceType::InferenceProvider).unwrap();
        assert_eq!(json, "\"azure_openai\"");
        let back: ServiceType = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ServiceType::InferenceProvider);
    }

    #[test]
    fn test_validate_payload_required_fields() {
        let slack = ServiceType::MessagePlatform;
        assert!(slack.validate_payload(&payload(json!({"token": "x"}))).is_ok());
        assert!(slack.validate_payload(&payload(json!({"bot_token": "xoxb-1"}))).is_ok());
        assert!(slack.validate_payload(&payload(json!({"bot_token": "  "}))).is_err());
        assert!(slack.validate_payload(&payload(json!({}))).is_err());

        let azure = ServiceType::InferenceProvider;
        let err = azure
            .validate_payload(&payload(json!({"endpoint": "https://x", "api_key": "k"})))
            .unwrap_err();
        assert!(err.contains("deployment"));

        let other = ServiceType::Other("notion".to_string());
        assert!(other.validate_payload(&payload(json!({"anything": 1}))).is_ok());
    }

    #[test]
    fn test_slack_optional_fields_are_not_required() {
        let slack = ServiceType::MessagePlatform;
        assert!(slack.validate_payload(&payload(json!({"bot_token": "xoxb-1"}))).is_ok());
        assert!(slack
            .validate_payload(&payload(json!({"bot_token": "xoxb-1", "signing_secret": "s", "app_token": "xapp-1"})))
            .is_ok());
        let err = slack
            .validate_payload(&payload(json!({"signing_secret": "s"})))
            .unwrap_err();
        assert!(err.contains("bot_token"));
    }

    #[test]
    fn test_secret_payload_rejects_non_objects() {
        assert!(SecretPayload::from_value(json!("token")).is_err());
        assert!(SecretPayload::from_value(json!([1, 2])).is_err());
    }

    #[test]
    fn test_secret_payload_debug_shows_only_keys() {
        let p = payload(json!({"bot_token": "xoxb-secret"}));
        let debug = format!("{:?}", p);
        assert!(debug.contains("bot_token"));
        assert!(!debug.contains("xoxb-secret"));
    }

    #[test]
    fn test_status_of_absent_record_is_not_configured() {
        assert_eq!(TestStatus::of(None), TestStatus::NotConfigured);
    }

    #[test]
    fn test_remote_credential_deserialization() {
        let json = r#"{
            "id": 7,
            "service_type": "slack",
            "is_active": true,
            "last_tested_at": null,
            "test_status": "pending",
            "test_message": null,
            "created_at": "2024-05-01T12:00:00"
        }"#;
        let remote: RemoteCredential = serde_json::from_str(json).unwrap();
        assert_eq!(remote.service_type, ServiceType::MessagePlatform);
        assert_eq!(remote.test_status.as_deref(), Some("pending"));
    }
}
