//! OAuth linking handshake for services reached through a provider grant.
//!
//! `begin_link` asks the backend for the provider's authorization URL and
//! remembers its one-time `state`. `complete_link` takes the redirect the
//! provider sent back, checks the state, exchanges the code with the stored
//! OAuth client registration and saves the resulting tokens as the linked
//! service's credential.

use std::sync::Arc;

use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{info, warn};

use super::exchange::{exchange_code_for_token, ClientRegistration};
use super::state::StateManager;
use crate::api::ApiError;
use crate::auth::SessionManager;
use crate::config::ServiceEndpoints;
use crate::credentials::{ConnectionTester, CredentialStore};
use crate::error::{Error, Result};
use crate::models::{CredentialRecord, PrincipalId, SecretPayload, ServiceType};

/// Query parameters of an OAuth redirect.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct LinkCallback {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
}

impl LinkCallback {
    /// Parse either a full redirect URL or its bare query string.
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        let query = match input.split_once('?') {
            Some((_, query)) => query,
            None => input,
        };
        let query = query.split('#').next().unwrap_or_default();
        serde_urlencoded::from_str(query)
            .map_err(|e| Error::OAuthError(format!("Malformed callback: {}", e)))
    }
}

/// Provider that grants access to a linkable service.
fn provider_for(service_type: &ServiceType) -> Option<&'static str> {
    match service_type {
        ServiceType::DocumentStore => Some("google"),
        _ => None,
    }
}

fn state_from_url(url: &str) -> Option<String> {
    let (_, query) = url.split_once('?')?;
    let query = query.split('#').next().unwrap_or_default();
    let pairs: Vec<(String, String)> = serde_urlencoded::from_str(query).ok()?;
    pairs
        .into_iter()
        .find(|(key, _)| key == "state")
        .map(|(_, value)| value)
}

pub struct LinkCoordinator {
    sessions: SessionManager,
    store: Arc<CredentialStore>,
    tester: Arc<ConnectionTester>,
    states: StateManager,
    http: Client,
    endpoints: ServiceEndpoints,
}

impl LinkCoordinator {
    pub fn new(
        sessions: SessionManager,
        store: Arc<CredentialStore>,
        tester: Arc<ConnectionTester>,
        states: StateManager,
        http: Client,
        endpoints: ServiceEndpoints,
    ) -> Self {
        Self {
            sessions,
            store,
            tester,
            states,
            http,
            endpoints,
        }
    }

    /// Start linking `service_type` for `owner`. Returns the URL the user
    /// must open. No credential changes.
    pub async fn begin_link(&self, owner: PrincipalId, service_type: ServiceType) -> Result<String> {
        let provider = provider_for(&service_type).ok_or_else(|| {
            Error::OAuthError(format!("{} cannot be linked through OAuth", service_type.label()))
        })?;
        if self.store.get(owner, &ServiceType::OAuthClient).is_none() {
            return Err(Error::NotConfigured(ServiceType::OAuthClient.to_string()));
        }

        let token = self.sessions.bearer().await?;
        let grant = self
            .sessions
            .api()
            .with_token(token)
            .oauth_authorize(provider)
            .await
            .map_err(|e| match e {
                ApiError::Unauthorized => Error::NotAuthenticated,
                ApiError::NetworkError(_) | ApiError::ServerError(_) | ApiError::RateLimited => {
                    Error::from(e)
                }
                other => Error::OAuthError(other.to_string()),
            })?;

        let mut url = grant.authorization_url;
        match grant.state.or_else(|| state_from_url(&url)) {
            Some(state) => self.states.remember(&state, owner, service_type.clone()),
            None => {
                let state = self.states.create_state(owner, service_type.clone());
                let separator = if url.contains('?') { '&' } else { '?' };
                url = format!("{}{}state={}", url, separator, urlencoding::encode(&state));
            }
        }
        info!(owner = owner, service = %service_type, provider = provider, "OAuth link started");
        Ok(url)
    }

    /// Finish a link from the provider's redirect. Performs one save of the
    /// linked service's credential, then tests it.
    pub async fn complete_link(&self, owner: PrincipalId, callback: &LinkCallback) -> Result<CredentialRecord> {
        if let Some(ref error) = callback.error {
            if let Some(ref state) = callback.state {
                self.states.validate_and_consume(state);
            }
            let message = match callback.error_description {
                Some(ref description) => format!("Authorization failed: {} ({})", error, description),
                None => format!("Authorization failed: {}", error),
            };
            return Err(Error::OAuthError(message));
        }

        let state = callback
            .state
            .as_deref()
            .ok_or_else(|| Error::OAuthError("Callback is missing the state parameter".into()))?;
        let link = self
            .states
            .validate_and_consume(state)
            .ok_or_else(|| Error::OAuthError("Unknown or expired state".into()))?;
        if link.owner != owner {
            return Err(Error::OAuthError("State was issued to a different principal".into()));
        }
        let code = callback
            .code
            .as_deref()
            .ok_or_else(|| Error::OAuthError("Callback is missing the authorization code".into()))?;

        let client = self
            .store
            .get(owner, &ServiceType::OAuthClient)
            .ok_or_else(|| Error::OAuthError("OAuth client credentials are not configured".into()))?;
        let client_id = client.payload.field("client_id").unwrap_or_default();
        let client_secret = client.payload.field("client_secret").unwrap_or_default();
        let token_uri = client
            .payload
            .field("token_uri")
            .unwrap_or(self.endpoints.google_token.as_str());
        let registration = ClientRegistration {
            token_url: token_uri,
            redirect_uri: client
                .payload
                .field("redirect_uri")
                .unwrap_or(self.endpoints.oauth_redirect_uri.as_str()),
            client_id,
            client_secret,
        };

        let grant = exchange_code_for_token(&self.http, &registration, code)
            .await
            .map_err(|e| Error::OAuthError(format!("{:#}", e)))?;

        let mut fields = Map::new();
        fields.insert("token".into(), json!(grant.access_token));
        if let Some(refresh_token) = grant.refresh_token {
            fields.insert("refresh_token".into(), json!(refresh_token));
        }
        fields.insert("token_uri".into(), json!(token_uri));
        fields.insert("client_id".into(), json!(client_id));
        fields.insert("client_secret".into(), json!(client_secret));
        fields.insert("scopes".into(), Value::from(grant.scopes));
        if let Some(expires_at) = grant.expires_at {
            fields.insert("expiry".into(), json!(expires_at.to_rfc3339()));
        }

        let saved = self
            .store
            .save(owner, link.service_type.clone(), SecretPayload::new(fields))?;
        info!(owner = owner, service = %link.service_type, "OAuth link completed");

        if let Err(e) = self.tester.test(owner, &link.service_type).await {
            warn!(error = %e, service = %link.service_type, "Connection test after link failed to run");
        }
        Ok(self.store.get(owner, &link.service_type).unwrap_or(saved))
    }

    /// Forget every pending link.
    pub fn clear(&self) {
        self.states.clear();
    }

    /// Links still waiting for their redirect; expired ones are dropped.
    pub fn pending(&self) -> usize {
        self.states.cleanup_expired();
        self.states.count()
    }
}
