//! One client context: session, credential set, tester and OAuth links.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use tokio::sync::watch;
use tracing::{debug, info};

use crate::api::ApiClient;
use crate::auth::{authorize, open_slot, require, Capability, Decision, Session, SessionManager};
use crate::config::{Config, TokenStorage};
use crate::credentials::{ConnectionTester, CredentialStore, RemoteVerifier, VerifierTable};
use crate::error::{Error, Result};
use crate::models::{
    CredentialRecord, Principal, PrincipalId, Registration, RemoteCredential, SecretPayload,
    ServiceType, Verdict,
};
use crate::oauth::{LinkCallback, LinkCoordinator, StateManager};
use crate::resolution::{AuthState, Resolution};

pub struct ClientContext {
    config: Config,
    sessions: SessionManager,
    store: Arc<CredentialStore>,
    tester: Arc<ConnectionTester>,
    links: LinkCoordinator,
}

impl ClientContext {
    /// Build a context from configuration and restore any persisted
    /// session. `passphrase` unlocks sealed token storage, the persisted
    /// credential set and pending OAuth links.
    pub fn init(config: Config, passphrase: Option<&str>) -> Result<Self> {
        let api = ApiClient::new(&config.api_base_url)
            .map_err(|e| Error::NetworkError(e.to_string()))?;

        let needs_dir = config.token_storage != TokenStorage::Memory || config.persist_credentials;
        let data_dir = if needs_dir {
            Some(config.data_dir()?)
        } else {
            None
        };
        let dir = data_dir.clone().unwrap_or_default();

        let slot = open_slot(config.token_storage, &dir, &config.context, passphrase)?;
        let sessions = SessionManager::new(
            api.clone(),
            Session::new(slot),
            config.access_token_lifetime(),
        );

        let (store, states) = match (config.persist_credentials, passphrase) {
            (true, Some(passphrase)) if !passphrase.is_empty() => (
                CredentialStore::persistent(dir.clone(), passphrase)?,
                StateManager::persistent(dir.clone(), passphrase)?,
            ),
            (true, _) => {
                return Err(Error::StorageError(
                    "Persisting credentials requires a passphrase".into(),
                ))
            }
            (false, _) => (CredentialStore::new(), StateManager::default()),
        };
        let store = Arc::new(store);

        let verifiers = VerifierTable::standard(
            api.http().clone(),
            &config.endpoints,
            Arc::new(RemoteVerifier::new(sessions.clone())),
        );
        let tester = Arc::new(ConnectionTester::new(
            Arc::clone(&store),
            verifiers,
            StdDuration::from_secs(config.test_timeout_secs),
        ));
        let links = LinkCoordinator::new(
            sessions.clone(),
            Arc::clone(&store),
            Arc::clone(&tester),
            states,
            api.http().clone(),
            config.endpoints.clone(),
        );

        let restored = sessions.restore()?;
        debug!(context = %config.context, restored = restored, data_dir = ?data_dir, "Client context initialized");

        Ok(Self {
            config,
            sessions,
            store,
            tester,
            links,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn subscribe(&self) -> watch::Receiver<Resolution<AuthState>> {
        self.sessions.subscribe()
    }

    // ===== Session =====

    pub async fn login(&self, username: &str, password: &str) -> Result<Principal> {
        self.sessions.login(username, password).await
    }

    pub async fn signup(&self, registration: &Registration) -> Result<Principal> {
        self.sessions.signup(registration).await
    }

    pub async fn current_principal(&self) -> Result<Principal> {
        self.sessions.current_principal().await
    }

    /// End the session and drop everything it owned. Local state is gone
    /// before the best-effort remote logout starts.
    pub async fn logout(&self) {
        self.store.clear();
        self.links.clear();
        self.sessions.logout().await;
    }

    pub fn authorize(&self, capability: Capability) -> Decision {
        authorize(capability, self.sessions.session().as_ref())
    }

    /// The principal credential operations act for.
    fn owner(&self) -> Result<PrincipalId> {
        let session = self.sessions.session();
        require(Capability::Member, session.as_ref())?;
        session
            .and_then(|s| s.principal_id)
            .ok_or(Error::NotAuthenticated)
    }

    // ===== Credentials =====

    pub fn list_credentials(&self) -> Result<Vec<CredentialRecord>> {
        Ok(self.store.list(self.owner()?))
    }

    pub fn get_credential(&self, service_type: &ServiceType) -> Result<Option<CredentialRecord>> {
        Ok(self.store.get(self.owner()?, service_type))
    }

    /// Save a credential. The backend copy is written first; the local
    /// record only changes once the backend accepted it.
    pub async fn save_credential(
        &self,
        service_type: ServiceType,
        payload: SecretPayload,
    ) -> Result<CredentialRecord> {
        let owner = self.owner()?;
        service_type
            .validate_payload(&payload)
            .map_err(Error::ValidationError)?;

        let token = self.sessions.bearer().await?;
        self.sessions
            .api()
            .with_token(token)
            .upsert_credential(&service_type, &payload)
            .await?;

        let record = self.store.save(owner, service_type, payload)?;
        info!(owner = owner, service = %record.service_type, "Credential saved");
        Ok(record)
    }

    pub async fn test_credential(&self, service_type: &ServiceType) -> Result<Verdict> {
        let owner = self.owner()?;
        self.tester.test(owner, service_type).await
    }

    /// Credential metadata as the backend knows it.
    pub async fn remote_credentials(&self) -> Result<Vec<RemoteCredential>> {
        self.owner()?;
        let token = self.sessions.bearer().await?;
        Ok(self.sessions.api().with_token(token).list_credentials().await?)
    }

    // ===== OAuth linking =====

    pub async fn begin_link(&self, service_type: ServiceType) -> Result<String> {
        let owner = self.owner()?;
        self.links.begin_link(owner, service_type).await
    }

    /// Complete a link from the redirect URL or its query string.
    pub async fn complete_link(&self, callback: &str) -> Result<CredentialRecord> {
        let owner = self.owner()?;
        let callback = LinkCallback::parse(callback)?;
        self.links.complete_link(owner, &callback).await
    }

    pub fn pending_links(&self) -> usize {
        self.links.pending()
    }

    /// Release the context without ending the session. Persisted links stay
    /// pending so a later context can complete them.
    pub fn teardown(self) {
        debug!(
            context = %self.config.context,
            pending_links = self.links.pending(),
            "Client context torn down"
        );
    }
}
