//! API client for the keyhold identity/credential backend.
//!
//! `ApiClient` wraps a shared `reqwest::Client` and a base URL. A client
//! created with `with_token` sends the access credential as a bearer token.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::{header, Client};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use crate::models::{Principal, Registration, RemoteCredential, SecretPayload, ServiceType};

use super::ApiError;

// ============================================================================
// Constants
// ============================================================================

/// Base URL used when no configuration overrides it.
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8000/api";

/// HTTP request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Maximum number of retries for rate-limited (429) GET requests.
/// Writes and logins are never retried.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
const INITIAL_BACKOFF_MS: u64 = 1000;

/// Access/refresh credential pair returned by login and refresh.
#[derive(Clone, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
}

impl fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenPair")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("token_type", &self.token_type)
            .finish()
    }
}

/// One-time authorization endpoint for an OAuth link.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthorizationGrant {
    pub authorization_url: String,
    #[serde(default)]
    pub state: Option<String>,
}

/// Connection test result computed by the backend.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteVerdict {
    pub status: String,
    pub message: String,
    #[serde(default, deserialize_with = "crate::models::lenient_datetime")]
    pub tested_at: Option<DateTime<Utc>>,
}

/// API client for the keyhold backend.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .field("authenticated", &self.token.is_some())
            .finish()
    }
}

impl ApiClient {
    /// Create a new API client
    pub fn new(base_url: &str) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self::with_client(client, base_url))
    }

    /// Create a client on top of an existing connection pool.
    pub fn with_client(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: None,
        }
    }

    /// Create a new ApiClient with the given token, sharing the connection pool.
    pub fn with_token(&self, token: impl Into<String>) -> Self {
        Self {
            client: self.client.clone(), // Cheap clone, shares connection pool
            base_url: self.base_url.clone(),
            token: Some(token.into()),
        }
    }

    /// The underlying HTTP client, for callers that talk to other hosts.
    pub fn http(&self) -> &Client {
        &self.client
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn auth_headers(&self) -> Result<header::HeaderMap, ApiError> {
        let mut headers = header::HeaderMap::new();
        headers.insert(header::ACCEPT, header::HeaderValue::from_static("application/json"));
        if let Some(ref token) = self.token {
            let value = header::HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|_| ApiError::InvalidResponse("Token contains invalid characters".into()))?;
            headers.insert(header::AUTHORIZATION, value);
        }
        Ok(headers)
    }

    /// Check if response is successful, returning an error with body if not.
    /// Returns Ok(Some(response)) for success, Ok(None) for rate limit (should retry),
    /// or Err for other errors.
    async fn check_response_for_retry(
        response: reqwest::Response,
    ) -> Result<Option<reqwest::Response>, ApiError> {
        if response.status().is_success() {
            Ok(Some(response))
        } else if response.status().as_u16() == 429 {
            Ok(None)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    async fn parse<T: DeserializeOwned>(response: reqwest::Response, url: &str) -> Result<T, ApiError> {
        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| {
            ApiError::InvalidResponse(format!("Failed to parse JSON response from {}: {}", url, e))
        })
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let url = self.url(path);
        let mut retries = 0;
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            let response = self
                .client
                .get(&url)
                .headers(self.auth_headers()?)
                .send()
                .await?;

            match Self::check_response_for_retry(response).await? {
                Some(response) => return Self::parse(response, &url).await,
                None => {
                    retries += 1;
                    if retries > MAX_RATE_LIMIT_RETRIES {
                        return Err(ApiError::RateLimited);
                    }
                    warn!(url = %url, retry = retries, backoff_ms = backoff_ms, "Rate limited, backing off");
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    backoff_ms *= 2; // Exponential backoff
                }
            }
        }
    }

    /// POST without retries; the caller decides whether to try again.
    async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: Option<&B>,
    ) -> Result<T, ApiError> {
        let response = self.send_post(path, body).await?;
        Self::parse(response, &self.url(path)).await
    }

    async fn send_post<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: Option<&B>,
    ) -> Result<reqwest::Response, ApiError> {
        let url = self.url(path);
        let mut request = self.client.post(&url).headers(self.auth_headers()?);
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request.send().await?;
        Self::check_response(response).await
    }

    // ===== Authentication =====

    /// Exchange a username and password for a credential pair.
    pub async fn authenticate(&self, username: &str, password: &str) -> Result<TokenPair, ApiError> {
        debug!(username = %username, "Authenticating");
        let body = json!({ "username": username, "password": password });
        self.post("/auth/login", Some(&body)).await
    }

    /// Exchange a refresh credential for a new pair.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, ApiError> {
        debug!("Refreshing access token");
        let body = json!({ "refresh_token": refresh_token });
        self.post("/auth/refresh", Some(&body)).await
    }

    /// Resolve the principal the bearer token belongs to.
    pub async fn me(&self) -> Result<Principal, ApiError> {
        self.get("/auth/me").await
    }

    /// Invalidate the server-side session. The response body is ignored.
    pub async fn logout(&self) -> Result<(), ApiError> {
        self.send_post::<()>("/auth/logout", None).await?;
        Ok(())
    }

    pub async fn signup(&self, registration: &Registration) -> Result<Principal, ApiError> {
        debug!(username = %registration.username, "Registering principal");
        self.post("/auth/signup", Some(registration)).await
    }

    // ===== Credentials =====

    pub async fn list_credentials(&self) -> Result<Vec<RemoteCredential>, ApiError> {
        self.get("/credentials/").await
    }

    pub async fn upsert_credential(
        &self,
        service_type: &ServiceType,
        payload: &SecretPayload,
    ) -> Result<RemoteCredential, ApiError> {
        debug!(service = %service_type, "Upserting credential");
        let body = json!({ "service_type": service_type, "credentials": payload });
        self.post("/credentials/", Some(&body)).await
    }

    /// Ask the backend to verify a credential it holds.
    pub async fn test_credential(&self, service_type: &ServiceType) -> Result<RemoteVerdict, ApiError> {
        let path = format!(
            "/credentials/{}/test",
            urlencoding::encode(service_type.as_str())
        );
        self.post::<RemoteVerdict, ()>(&path, None).await
    }

    // ===== OAuth =====

    pub async fn oauth_authorize(&self, provider: &str) -> Result<AuthorizationGrant, ApiError> {
        let path = format!("/oauth/{}/authorize", urlencoding::encode(provider));
        self.get(&path).await
    }
}
