//! OAuth token exchange logic.
//!
//! Handles exchanging authorization codes for access tokens.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// OAuth token exchange request
#[derive(Serialize)]
struct TokenRequest<'a> {
    grant_type: &'a str,
    code: &'a str,
    redirect_uri: &'a str,
    client_id: &'a str,
    client_secret: &'a str,
}

/// OAuth token response (standard OAuth 2.0)
#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    scope: Option<String>,
}

/// Tokens granted by the provider for a linked account.
#[derive(Clone)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub scopes: Vec<String>,
}

impl std::fmt::Debug for TokenGrant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenGrant")
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("expires_at", &self.expires_at)
            .field("scopes", &self.scopes)
            .finish_non_exhaustive()
    }
}

/// OAuth client registration used for the exchange.
pub struct ClientRegistration<'a> {
    pub token_url: &'a str,
    pub redirect_uri: &'a str,
    pub client_id: &'a str,
    pub client_secret: &'a str,
}

/// Absolute expiry for an `expires_in` lifetime. Values chrono cannot
/// represent are treated as no expiry.
fn expiry_from_now(seconds: i64) -> Option<DateTime<Utc>> {
    let expires_at =
        Duration::try_seconds(seconds).and_then(|lifetime| Utc::now().checked_add_signed(lifetime));
    if expires_at.is_none() {
        tracing::warn!(expires_in = seconds, "Ignoring out-of-range token lifetime");
    }
    expires_at
}

/// Exchange an authorization code for tokens at the provider's token
/// endpoint.
pub async fn exchange_code_for_token(
    client: &reqwest::Client,
    registration: &ClientRegistration<'_>,
    code: &str,
) -> Result<TokenGrant> {
    let form = TokenRequest {
        grant_type: "authorization_code",
        code,
        redirect_uri: registration.redirect_uri,
        client_id: registration.client_id,
        client_secret: registration.client_secret,
    };

    tracing::debug!(token_url = %registration.token_url, "Exchanging authorization code for token");

    let response = client
        .post(registration.token_url)
        .header("Accept", "application/json")
        .form(&form)
        .send()
        .await
        .context("Failed to send token exchange request")?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
        return Err(anyhow!("Token exchange failed with status {}: {}", status, body));
    }

    let token_response: TokenResponse = response
        .json()
        .await
        .context("Failed to parse token response")?;

    tracing::debug!(
        has_refresh_token = token_response.refresh_token.is_some(),
        expires_in = ?token_response.expires_in,
        "Token exchange successful"
    );

    let expires_at = token_response.expires_in.and_then(expiry_from_now);
    let scopes = token_response
        .scope
        .map(|s| s.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default();

    Ok(TokenGrant {
        access_token: token_response.access_token,
        refresh_token: token_response.refresh_token,
        expires_at,
        scopes,
    })
}
