//! Per-service connection verification strategies.
//!
//! Each service type maps to an `Arc<dyn Verifier>` in a `VerifierTable`.
//! Service types without a local strategy fall back to the backend's
//! verification endpoint.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use crate::auth::SessionManager;
use crate::config::ServiceEndpoints;
use crate::models::{SecretPayload, ServiceType};

/// Azure OpenAI API version used when the payload does not name one.
const DEFAULT_AZURE_API_VERSION: &str = "2023-05-15";

/// Longest provider error body quoted in a failure message.
const MAX_DETAIL_LENGTH: usize = 200;

/// Strategy for checking that a stored credential actually works.
///
/// `Ok` carries a human-readable success message; `Err` becomes a failed
/// verdict with the error as its message. Implementations must not modify
/// the payload.
#[async_trait]
pub trait Verifier: Send + Sync {
    async fn verify(&self, service_type: &ServiceType, payload: &SecretPayload) -> Result<String>;
}

fn required<'a>(payload: &'a SecretPayload, names: &[&str]) -> Result<&'a str> {
    names
        .iter()
        .find_map(|name| payload.field(name))
        .ok_or_else(|| anyhow!("Missing '{}'", names.join("' or '")))
}

async fn failure_detail(response: reqwest::Response) -> String {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let mut detail: String = body.chars().take(MAX_DETAIL_LENGTH).collect();
    if detail.len() < body.len() {
        detail.push_str("...");
    }
    if detail.is_empty() {
        format!("HTTP {}", status)
    } else {
        format!("HTTP {}: {}", status, detail)
    }
}

// ============================================================================
// Message platform (Slack)
// ============================================================================

#[derive(Deserialize)]
struct SlackAuthTest {
    ok: bool,
    #[serde(default)]
    team: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

pub struct SlackVerifier {
    http: Client,
    api_base: String,
}

impl SlackVerifier {
    pub fn new(http: Client, api_base: &str) -> Self {
        Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl Verifier for SlackVerifier {
    async fn verify(&self, _service_type: &ServiceType, payload: &SecretPayload) -> Result<String> {
        let token = required(payload, &["bot_token", "token"])?;
        let response = self
            .http
            .post(format!("{}/auth.test", self.api_base))
            .bearer_auth(token)
            .send()
            .await
            .context("Connection failed")?;
        if !response.status().is_success() {
            bail!("Connection failed: {}", failure_detail(response).await);
        }

        let result: SlackAuthTest = response.json().await.context("Unexpected Slack response")?;
        if !result.ok {
            bail!(
                "Connection failed: {}",
                result.error.as_deref().unwrap_or("unknown error")
            );
        }
        Ok(format!(
            "Connected to workspace: {}",
            result.team.as_deref().unwrap_or("unknown")
        ))
    }
}

// ============================================================================
// Inference provider (Azure OpenAI)
// ============================================================================

pub struct AzureOpenAiVerifier {
    http: Client,
}

impl AzureOpenAiVerifier {
    pub fn new(http: Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl Verifier for AzureOpenAiVerifier {
    async fn verify(&self, _service_type: &ServiceType, payload: &SecretPayload) -> Result<String> {
        let endpoint = required(payload, &["endpoint"])?.trim_end_matches('/');
        let api_key = required(payload, &["api_key"])?;
        let deployment = required(payload, &["deployment"])?;
        let api_version = payload
            .field("api_version")
            .unwrap_or(DEFAULT_AZURE_API_VERSION);

        let url = format!(
            "{}/openai/deployments/{}/chat/completions?api-version={}",
            endpoint,
            urlencoding::encode(deployment),
            urlencoding::encode(api_version)
        );
        let body = json!({
            "messages": [{"role": "user", "content": "Test"}],
            "max_tokens": 10,
        });

        let response = self
            .http
            .post(&url)
            .header("api-key", api_key)
            .json(&body)
            .send()
            .await
            .context("Connection failed")?;
        if !response.status().is_success() {
            bail!("Connection failed: {}", failure_detail(response).await);
        }
        Ok(format!(
            "Successfully connected to Azure OpenAI deployment '{}'",
            deployment
        ))
    }
}

// ============================================================================
// Document store (Google Drive)
// ============================================================================

#[derive(Deserialize)]
struct DriveAbout {
    user: DriveUser,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveUser {
    #[serde(default)]
    email_address: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
}

pub struct GoogleDriveVerifier {
    http: Client,
    api_base: String,
}

impl GoogleDriveVerifier {
    pub fn new(http: Client, api_base: &str) -> Self {
        Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl Verifier for GoogleDriveVerifier {
    async fn verify(&self, _service_type: &ServiceType, payload: &SecretPayload) -> Result<String> {
        let token = required(payload, &["token", "access_token"])?;
        let response = self
            .http
            .get(format!("{}/drive/v3/about", self.api_base))
            .query(&[("fields", "user")])
            .bearer_auth(token)
            .send()
            .await
            .context("Connection failed")?;
        if !response.status().is_success() {
            bail!("Connection failed: {}", failure_detail(response).await);
        }

        let about: DriveAbout = response.json().await.context("Unexpected Drive response")?;
        let who = about
            .user
            .email_address
            .or(about.user.display_name)
            .unwrap_or_else(|| "unknown".to_string());
        Ok(format!("Connected to Google Drive for user: {}", who))
    }
}

// ============================================================================
// OAuth client registration (format check only)
// ============================================================================

pub struct OAuthClientVerifier;

#[async_trait]
impl Verifier for OAuthClientVerifier {
    async fn verify(&self, _service_type: &ServiceType, payload: &SecretPayload) -> Result<String> {
        let client_id = payload.field("client_id").unwrap_or_default();
        let client_secret = payload.field("client_secret").unwrap_or_default();

        if client_id.is_empty() || client_secret.is_empty() {
            bail!("Client ID and Client Secret are required");
        }
        if !client_id.ends_with(".apps.googleusercontent.com") {
            bail!("Invalid Client ID format. Should end with .apps.googleusercontent.com");
        }
        if !client_secret.starts_with("GOCSPX-") {
            bail!("Invalid Client Secret format. Should start with GOCSPX-");
        }
        Ok("OAuth client credentials look valid. Link the document store to authorize.".to_string())
    }
}

// ============================================================================
// Backend-delegated verification
// ============================================================================

/// Asks the backend to test the credential it holds for this service.
pub struct RemoteVerifier {
    sessions: SessionManager,
}

impl RemoteVerifier {
    pub fn new(sessions: SessionManager) -> Self {
        Self { sessions }
    }
}

#[async_trait]
impl Verifier for RemoteVerifier {
    async fn verify(&self, service_type: &ServiceType, _payload: &SecretPayload) -> Result<String> {
        let token = self.sessions.bearer().await?;
        let verdict = self
            .sessions
            .api()
            .with_token(token)
            .test_credential(service_type)
            .await
            .context("Connection failed")?;

        if verdict.status.eq_ignore_ascii_case("success") {
            Ok(verdict.message)
        } else {
            Err(anyhow!(verdict.message))
        }
    }
}

// ============================================================================
// Strategy table
// ============================================================================

pub struct VerifierTable {
    strategies: HashMap<ServiceType, Arc<dyn Verifier>>,
    fallback: Arc<dyn Verifier>,
}

impl VerifierTable {
    /// A table with no per-service strategies.
    pub fn new(fallback: Arc<dyn Verifier>) -> Self {
        Self {
            strategies: HashMap::new(),
            fallback,
        }
    }

    /// Built-in strategies for the known service types; everything else
    /// goes to `fallback`.
    pub fn standard(http: Client, endpoints: &ServiceEndpoints, fallback: Arc<dyn Verifier>) -> Self {
        Self::new(fallback)
            .with(
                ServiceType::MessagePlatform,
                Arc::new(SlackVerifier::new(http.clone(), &endpoints.slack_api)),
            )
            .with(
                ServiceType::InferenceProvider,
                Arc::new(AzureOpenAiVerifier::new(http.clone())),
            )
            .with(
                ServiceType::DocumentStore,
                Arc::new(GoogleDriveVerifier::new(http, &endpoints.google_api)),
            )
            .with(ServiceType::OAuthClient, Arc::new(OAuthClientVerifier))
    }

    pub fn with(mut self, service_type: ServiceType, verifier: Arc<dyn Verifier>) -> Self {
        self.strategies.insert(service_type, verifier);
        self
    }

    pub fn get(&self, service_type: &ServiceType) -> Arc<dyn Verifier> {
        self.strategies
            .get(service_type)
            .cloned()
            .unwrap_or_else(|| Arc::clone(&self.fallback))
    }
}
