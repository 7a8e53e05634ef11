//! Session lifecycle for one client context.
//!
//! `SessionManager` owns the token slot and publishes the authentication
//! state on a watch channel. Refreshes are single-flight and run on a
//! spawned task, so dropping a caller (or logging out) never cancels a
//! refresh halfway through a slot write. Every login, logout and purge bumps
//! the session epoch; a refresh that finishes under an older epoch is
//! discarded.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Duration;
use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::session::{Session, SessionData};
use crate::api::{ApiClient, ApiError};
use crate::error::{Error, Result};
use crate::models::principal::{validate_password, validate_username};
use crate::models::{Principal, Registration};
use crate::resolution::{AuthState, Resolution};

type RefreshFuture = Shared<BoxFuture<'static, Result<SessionData>>>;

struct InflightRefresh {
    id: u64,
    epoch: u64,
    future: RefreshFuture,
}

struct Inner {
    api: ApiClient,
    session: Mutex<Session>,
    epoch: AtomicU64,
    next_refresh_id: AtomicU64,
    refresh: Mutex<Option<InflightRefresh>>,
    state: watch::Sender<Resolution<AuthState>>,
    lifetime: Duration,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

impl Inner {
    fn publish(&self, value: Resolution<AuthState>) {
        self.state.send_replace(value);
    }

    /// Destroy the session if it still belongs to `epoch`.
    fn purge(&self, epoch: u64, reason: &str) {
        let mut session = lock(&self.session);
        if self.epoch.load(Ordering::SeqCst) != epoch {
            return;
        }
        self.epoch.fetch_add(1, Ordering::SeqCst);
        if let Err(e) = session.clear() {
            warn!(error = %e, "Failed to clear token slot");
        }
        drop(session);
        info!(reason = reason, "Session purged");
        self.publish(Resolution::Resolved(AuthState::Anonymous));
    }

    async fn run_refresh(self: Arc<Self>, epoch: u64, current: SessionData) -> Result<SessionData> {
        if current.refresh_expired() {
            self.purge(epoch, "refresh credential expired");
            return Err(Error::NotAuthenticated);
        }

        let pair = match self.api.refresh(&current.refresh_token).await {
            Ok(pair) => pair,
            Err(e) if e.is_rejection() => {
                self.purge(epoch, "refresh rejected");
                return Err(Error::NotAuthenticated);
            }
            Err(ApiError::RateLimited) => return Err(Error::RateLimited),
            Err(e) => {
                warn!(error = %e, "Token refresh failed, keeping stored credentials");
                return Err(Error::NetworkError(e.to_string()));
            }
        };

        if current.role_conflict(&pair) {
            self.purge(epoch, "role changed during session");
            return Err(Error::NotAuthenticated);
        }

        let next = current.renew(pair, self.lifetime);
        let mut session = lock(&self.session);
        if self.epoch.load(Ordering::SeqCst) != epoch {
            debug!("Discarding refresh result from a previous session");
            return Err(Error::NotAuthenticated);
        }
        session.update(next.clone());
        if let Err(e) = session.save() {
            warn!(error = %e, "Failed to persist refreshed session");
        }
        debug!(expires_at = %next.expires_at, "Access token refreshed");
        Ok(next)
    }
}

/// Owner of the authenticated-principal lifecycle. Clone is cheap.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

impl SessionManager {
    pub fn new(api: ApiClient, session: Session, lifetime: Duration) -> Self {
        let (state, _) = watch::channel(Resolution::Pending);
        Self {
            inner: Arc::new(Inner {
                api,
                session: Mutex::new(session),
                epoch: AtomicU64::new(0),
                next_refresh_id: AtomicU64::new(0),
                refresh: Mutex::new(None),
                state,
                lifetime,
            }),
        }
    }

    /// Load a persisted session without touching the network.
    pub fn restore(&self) -> Result<bool> {
        let loaded = lock(&self.inner.session).load();
        match loaded {
            Ok(true) => Ok(true),
            Ok(false) => {
                self.inner.publish(Resolution::Resolved(AuthState::Anonymous));
                Ok(false)
            }
            Err(e) => {
                let err = Error::from(e);
                self.inner.publish(Resolution::Failed(err.clone()));
                Err(err)
            }
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Resolution<AuthState>> {
        self.inner.state.subscribe()
    }

    /// Snapshot of the active session.
    pub fn session(&self) -> Option<SessionData> {
        lock(&self.inner.session).data.clone()
    }

    pub fn access_token(&self) -> Option<String> {
        lock(&self.inner.session).token().map(str::to_string)
    }

    pub fn api(&self) -> &ApiClient {
        &self.inner.api
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<Principal> {
        let username = username.trim();
        validate_username(username).map_err(Error::ValidationError)?;
        validate_password(password).map_err(Error::ValidationError)?;

        let pair = self
            .inner
            .api
            .authenticate(username, password)
            .await
            .map_err(|e| match e {
                ApiError::Unauthorized | ApiError::AccessDenied(_) => Error::InvalidCredentials,
                ApiError::BadRequest(detail) | ApiError::Unprocessable(detail) => {
                    Error::ValidationError(detail)
                }
                ApiError::RateLimited => Error::RateLimited,
                other => Error::NetworkError(other.to_string()),
            })?;

        let data = SessionData::issue(pair, username, self.inner.lifetime);
        let epoch = {
            let mut session = lock(&self.inner.session);
            let epoch = self.inner.epoch.fetch_add(1, Ordering::SeqCst) + 1;
            lock(&self.inner.refresh).take();
            session.update(data);
            session.save()?;
            epoch
        };
        info!(username = %username, "Logged in");

        // No session is kept without a resolved principal.
        match self.current_principal().await {
            Ok(principal) => Ok(principal),
            Err(e) => {
                self.inner.purge(epoch, "principal unresolved after login");
                Err(e)
            }
        }
    }

    /// Resolve the principal behind the stored access credential, refreshing
    /// it at most once.
    pub async fn current_principal(&self) -> Result<Principal> {
        let result = self.resolve_principal().await;
        match &result {
            Ok(principal) => {
                self.inner
                    .publish(Resolution::Resolved(AuthState::Authenticated(principal.clone())));
            }
            Err(Error::NotAuthenticated) => {
                self.inner.publish(Resolution::Resolved(AuthState::Anonymous));
            }
            Err(e) => {
                if self.inner.state.borrow().is_pending() {
                    self.inner.publish(Resolution::Failed(e.clone()));
                }
            }
        }
        result
    }

    async fn resolve_principal(&self) -> Result<Principal> {
        let (mut data, epoch) = {
            let session = lock(&self.inner.session);
            let data = session.data.clone().ok_or(Error::NotAuthenticated)?;
            (data, self.inner.epoch.load(Ordering::SeqCst))
        };

        let mut refreshed = false;
        if data.is_expired() {
            data = self.refresh().await?;
            refreshed = true;
        }

        let principal = match self.inner.api.with_token(&data.access_token).me().await {
            Ok(principal) => principal,
            Err(ApiError::Unauthorized) if !refreshed => {
                data = self.refresh().await?;
                self.inner
                    .api
                    .with_token(&data.access_token)
                    .me()
                    .await
                    .map_err(|e| self.principal_error(epoch, e))?
            }
            Err(e) => return Err(self.principal_error(epoch, e)),
        };

        self.bind_principal(epoch, principal)
    }

    fn principal_error(&self, epoch: u64, err: ApiError) -> Error {
        match err {
            ApiError::Unauthorized => {
                self.inner.purge(epoch, "access credential rejected after refresh");
                Error::NotAuthenticated
            }
            other => Error::from(other),
        }
    }

    /// Attach the resolved identity to the session, destroying it when the
    /// backend reports a different principal or role than it was bound to.
    fn bind_principal(&self, epoch: u64, principal: Principal) -> Result<Principal> {
        let mut session = lock(&self.inner.session);
        let current_epoch = self.inner.epoch.load(Ordering::SeqCst);
        let (role, principal_id) = match session.data.as_ref() {
            Some(data) if current_epoch == epoch => (data.role, data.principal_id),
            _ => return Err(Error::NotAuthenticated),
        };

        let role_changed = role.is_some_and(|r| r != principal.role);
        let principal_changed = principal_id.is_some_and(|id| id != principal.id);
        if role_changed || principal_changed {
            drop(session);
            warn!(username = %principal.username, "Backend identity no longer matches session");
            self.inner.purge(epoch, "identity mismatch");
            return Err(Error::NotAuthenticated);
        }

        if let Some(data) = session.data.as_mut() {
            if data.role.is_none() || data.principal_id.is_none() {
                data.role = Some(principal.role);
                data.principal_id = Some(principal.id);
                if let Err(e) = session.save() {
                    warn!(error = %e, "Failed to persist resolved identity");
                }
            }
        }
        Ok(principal)
    }

    /// Single-flight refresh of the current session.
    pub async fn refresh(&self) -> Result<SessionData> {
        let (id, future) = {
            let session = lock(&self.inner.session);
            let mut inflight = lock(&self.inner.refresh);
            let epoch = self.inner.epoch.load(Ordering::SeqCst);
            match inflight.as_ref() {
                Some(existing) if existing.epoch == epoch => (existing.id, existing.future.clone()),
                _ => {
                    let current = session.data.clone().ok_or(Error::NotAuthenticated)?;
                    let id = self.inner.next_refresh_id.fetch_add(1, Ordering::SeqCst);
                    let handle = tokio::spawn(Arc::clone(&self.inner).run_refresh(epoch, current));
                    let future = async move {
                        handle
                            .await
                            .unwrap_or_else(|e| Err(Error::NetworkError(format!("refresh task failed: {}", e))))
                    }
                    .boxed()
                    .shared();
                    *inflight = Some(InflightRefresh {
                        id,
                        epoch,
                        future: future.clone(),
                    });
                    (id, future)
                }
            }
        };

        let result = future.await;

        let mut inflight = lock(&self.inner.refresh);
        if inflight.as_ref().is_some_and(|f| f.id == id) {
            inflight.take();
        }
        result
    }

    /// A bearer token for a backend call, refreshed first when it is close
    /// to expiry. A refresh that fails for transport reasons falls back to
    /// the current token while it is still valid.
    pub async fn bearer(&self) -> Result<String> {
        let data = self.session().ok_or(Error::NotAuthenticated)?;
        if !data.needs_refresh() {
            return Ok(data.access_token);
        }
        match self.refresh().await {
            Ok(next) => Ok(next.access_token),
            Err(Error::NetworkError(_)) | Err(Error::RateLimited) if !data.is_expired() => {
                Ok(data.access_token)
            }
            Err(e) => Err(e),
        }
    }

    /// End the session. Local state is cleared before the best-effort
    /// remote call, which may fail silently.
    pub async fn logout(&self) {
        let previous = {
            let mut session = lock(&self.inner.session);
            self.inner.epoch.fetch_add(1, Ordering::SeqCst);
            lock(&self.inner.refresh).take();
            let previous = session.data.clone();
            if let Err(e) = session.clear() {
                warn!(error = %e, "Failed to clear token slot");
            }
            previous
        };
        self.inner.publish(Resolution::Resolved(AuthState::Anonymous));

        if let Some(previous) = previous {
            info!(username = %previous.username, "Logged out");
            if let Err(e) = self.inner.api.with_token(&previous.access_token).logout().await {
                debug!(error = %e, "Remote logout failed");
            }
        }
    }

    /// Register a new principal. Does not authenticate.
    pub async fn signup(&self, registration: &Registration) -> Result<Principal> {
        registration.validate().map_err(Error::ValidationError)?;
        self.inner.api.signup(registration).await.map_err(|e| match e {
            ApiError::BadRequest(detail) if detail.to_lowercase().contains("already exists") => {
                Error::DuplicateUsername
            }
            ApiError::BadRequest(detail) | ApiError::Unprocessable(detail) => {
                Error::ValidationError(detail)
            }
            other => Error::from(other),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::session::test_token;
    use crate::auth::slot::{MemorySlot, TokenSlot};
    use crate::auth::{authorize, Capability, Decision, DenyReason};
    use crate::models::Role;
    use chrono::Utc;
    use mockito::{Matcher, Server, ServerGuard};
    use serde_json::json;
    use std::io::Write;
    use std::time::Duration as StdDuration;

    fn manager(server: &ServerGuard, slot: &MemorySlot) -> SessionManager {
        let api = ApiClient::new(&server.url()).unwrap();
        SessionManager::new(api, Session::new(Box::new(slot.clone())), Duration::minutes(30))
    }

    fn token(minutes: i64, role: &str) -> String {
        test_token(Utc::now() + Duration::minutes(minutes), 7, role)
    }

    fn me_body(role: &str) -> String {
        json!({"id": 7, "username": "alice", "email": "alice@example.com", "role": role}).to_string()
    }

    fn seed(slot: &MemorySlot, access: &str, refresh: &str) {
        let pair = crate::api::TokenPair {
            access_token: access.to_string(),
            refresh_token: refresh.to_string(),
            token_type: None,
        };
        slot.store(&SessionData::issue(pair, "alice", Duration::minutes(30)))
            .unwrap();
    }

    #[tokio::test]
    async fn test_login_resolves_principal_and_persists() {
        let mut server = Server::new_async().await;
        let access = token(30, "user");
        server
            .mock("POST", "/auth/login")
            .with_status(200)
            .with_body(json!({"access_token": access, "refresh_token": "R1"}).to_string())
            .create_async()
            .await;
        server
            .mock("GET", "/auth/me")
            .match_header("authorization", format!("Bearer {}", access).as_str())
            .with_status(200)
            .with_body(me_body("user"))
            .create_async()
            .await;

        let slot = MemorySlot::default();
        let manager = manager(&server, &slot);
        let rx = manager.subscribe();
        let principal = manager.login("alice", "correct-pw").await.unwrap();

        assert_eq!(principal.role, Role::Member);
        assert_eq!(slot.load().unwrap().unwrap().refresh_token, "R1");
        assert!(matches!(
            &*rx.borrow(),
            Resolution::Resolved(AuthState::Authenticated(p)) if p.username == "alice"
        ));
    }

    #[tokio::test]
    async fn test_login_wrong_password() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/auth/login")
            .with_status(401)
            .with_body(r#"{"detail": "Incorrect username or password"}"#)
            .create_async()
            .await;

        let slot = MemorySlot::default();
        let err = manager(&server, &slot).login("alice", "wrong").await.unwrap_err();

        assert_eq!(err, Error::InvalidCredentials);
        assert!(slot.load().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_login_purges_when_principal_unresolved() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/auth/login")
            .with_status(200)
            .with_body(r#"{"access_token": "A1", "refresh_token": "R1"}"#)
            .create_async()
            .await;
        server
            .mock("GET", "/auth/me")
            .with_status(503)
            .with_body(r#"{"detail": "maintenance"}"#)
            .create_async()
            .await;

        let slot = MemorySlot::default();
        let manager = manager(&server, &slot);
        let err = manager.login("alice", "correct-pw").await.unwrap_err();

        assert!(matches!(err, Error::NetworkError(_)));
        assert!(manager.session().is_none());
        assert!(slot.load().unwrap().is_none());
        assert_eq!(
            authorize(Capability::Member, manager.session().as_ref()),
            Decision::Deny(DenyReason::NotAuthenticated)
        );
        assert_eq!(*manager.subscribe().borrow(), Resolution::Resolved(AuthState::Anonymous));
    }

    #[tokio::test]
    async fn test_login_validates_before_network() {
        let server = Server::new_async().await;
        let slot = MemorySlot::default();
        let err = manager(&server, &slot).login("", "pw").await.unwrap_err();
        assert!(matches!(err, Error::ValidationError(_)));
    }

    #[tokio::test]
    async fn test_expired_token_refreshes_once_for_concurrent_callers() {
        let mut server = Server::new_async().await;
        let fresh = token(30, "user");
        let refresh = server
            .mock("POST", "/auth/refresh")
            .match_body(Matcher::Json(json!({"refresh_token": "R1"})))
            .with_status(200)
            .with_body(json!({"access_token": fresh, "refresh_token": "R2"}).to_string())
            .expect(1)
            .create_async()
            .await;
        let me = server
            .mock("GET", "/auth/me")
            .match_header("authorization", format!("Bearer {}", fresh).as_str())
            .with_status(200)
            .with_body(me_body("user"))
            .expect(2)
            .create_async()
            .await;

        let slot = MemorySlot::default();
        seed(&slot, &token(-1, "user"), "R1");
        let manager = manager(&server, &slot);
        assert!(manager.restore().unwrap());

        let (a, b) = tokio::join!(manager.current_principal(), manager.current_principal());
        assert_eq!(a.unwrap().id, 7);
        assert_eq!(b.unwrap().id, 7);
        assert_eq!(slot.load().unwrap().unwrap().refresh_token, "R2");
        refresh.assert_async().await;
        me.assert_async().await;
    }

    #[tokio::test]
    async fn test_rejected_access_token_refreshes_and_retries() {
        let mut server = Server::new_async().await;
        let stale = token(30, "user");
        let fresh = token(30, "user") + "x";
        server
            .mock("GET", "/auth/me")
            .match_header("authorization", format!("Bearer {}", stale).as_str())
            .with_status(401)
            .create_async()
            .await;
        server
            .mock("POST", "/auth/refresh")
            .with_status(200)
            .with_body(json!({"access_token": fresh, "refresh_token": "R2"}).to_string())
            .create_async()
            .await;
        server
            .mock("GET", "/auth/me")
            .match_header("authorization", format!("Bearer {}", fresh).as_str())
            .with_status(200)
            .with_body(me_body("user"))
            .create_async()
            .await;

        let slot = MemorySlot::default();
        seed(&slot, &stale, "R1");
        let manager = manager(&server, &slot);
        manager.restore().unwrap();

        assert_eq!(manager.current_principal().await.unwrap().username, "alice");
        assert_eq!(manager.access_token().as_deref(), Some(fresh.as_str()));
    }

    #[tokio::test]
    async fn test_rejected_refresh_purges_pair() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/auth/refresh")
            .with_status(401)
            .create_async()
            .await;

        let slot = MemorySlot::default();
        seed(&slot, &token(-1, "user"), "R1");
        let manager = manager(&server, &slot);
        manager.restore().unwrap();
        let rx = manager.subscribe();

        assert_eq!(manager.current_principal().await.unwrap_err(), Error::NotAuthenticated);
        assert!(slot.load().unwrap().is_none());
        assert!(manager.session().is_none());
        assert_eq!(*rx.borrow(), Resolution::Resolved(AuthState::Anonymous));
    }

    #[tokio::test]
    async fn test_expired_refresh_credential_purges_without_network() {
        let server = Server::new_async().await;
        let slot = MemorySlot::default();
        let manager = manager(&server, &slot);
        {
            let pair = crate::api::TokenPair {
                access_token: token(-2, "user"),
                refresh_token: token(-1, "user"),
                token_type: None,
            };
            let data = SessionData::issue(pair, "alice", Duration::minutes(30));
            lock(&manager.inner.session).update(data);
        }

        assert_eq!(manager.current_principal().await.unwrap_err(), Error::NotAuthenticated);
        assert!(manager.session().is_none());
    }

    #[tokio::test]
    async fn test_refresh_server_failure_keeps_pair() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/auth/refresh")
            .with_status(503)
            .create_async()
            .await;

        let slot = MemorySlot::default();
        seed(&slot, &token(-1, "user"), "R1");
        let manager = manager(&server, &slot);
        manager.restore().unwrap();

        assert!(matches!(
            manager.current_principal().await.unwrap_err(),
            Error::NetworkError(_)
        ));
        assert_eq!(slot.load().unwrap().unwrap().refresh_token, "R1");
    }

    #[tokio::test]
    async fn test_role_mismatch_destroys_session() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/auth/me")
            .with_status(200)
            .with_body(me_body("admin"))
            .create_async()
            .await;

        let slot = MemorySlot::default();
        seed(&slot, &token(30, "user"), "R1");
        let manager = manager(&server, &slot);
        manager.restore().unwrap();

        assert_eq!(manager.current_principal().await.unwrap_err(), Error::NotAuthenticated);
        assert!(slot.load().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_logout_clears_even_when_remote_fails() {
        let mut server = Server::new_async().await;
        let remote = server
            .mock("POST", "/auth/logout")
            .with_status(500)
            .expect(1)
            .create_async()
            .await;

        let slot = MemorySlot::default();
        seed(&slot, &token(30, "user"), "R1");
        let manager = manager(&server, &slot);
        manager.restore().unwrap();

        manager.logout().await;
        assert!(manager.session().is_none());
        assert!(slot.load().unwrap().is_none());
        assert_eq!(*manager.subscribe().borrow(), Resolution::Resolved(AuthState::Anonymous));
        remote.assert_async().await;
    }

    #[tokio::test]
    async fn test_logout_during_refresh_discards_late_result() {
        let mut server = Server::new_async().await;
        let body = json!({"access_token": token(30, "user"), "refresh_token": "R2"}).to_string();
        let refresh = server
            .mock("POST", "/auth/refresh")
            .with_status(200)
            .with_chunked_body(move |w| {
                std::thread::sleep(StdDuration::from_millis(300));
                w.write_all(body.as_bytes())
            })
            .expect(1)
            .create_async()
            .await;
        let me = server.mock("GET", "/auth/me").expect(0).create_async().await;
        server
            .mock("POST", "/auth/logout")
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        let slot = MemorySlot::default();
        seed(&slot, &token(-1, "user"), "R1");
        let manager = manager(&server, &slot);
        manager.restore().unwrap();

        let resolving = tokio::spawn({
            let manager = manager.clone();
            async move { manager.current_principal().await }
        });
        tokio::time::sleep(StdDuration::from_millis(100)).await;
        manager.logout().await;
        assert!(manager.session().is_none());

        assert_eq!(resolving.await.unwrap().unwrap_err(), Error::NotAuthenticated);
        assert!(manager.session().is_none());
        assert!(slot.load().unwrap().is_none());
        assert_eq!(*manager.subscribe().borrow(), Resolution::Resolved(AuthState::Anonymous));
        refresh.assert_async().await;
        me.assert_async().await;
    }

    #[tokio::test]
    async fn test_restore_without_session_resolves_anonymous() {
        let server = Server::new_async().await;
        let slot = MemorySlot::default();
        let manager = manager(&server, &slot);
        assert!(manager.subscribe().borrow().is_pending());

        assert!(!manager.restore().unwrap());
        assert_eq!(*manager.subscribe().borrow(), Resolution::Resolved(AuthState::Anonymous));
        assert_eq!(manager.current_principal().await.unwrap_err(), Error::NotAuthenticated);
    }

    #[tokio::test]
    async fn test_signup_errors() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/auth/signup")
            .match_body(Matcher::PartialJson(json!({"username": "alice"})))
            .with_status(400)
            .with_body(r#"{"detail": "User with this email or username already exists"}"#)
            .create_async()
            .await;
        server
            .mock("POST", "/auth/signup")
            .match_body(Matcher::PartialJson(json!({"username": "bob"})))
            .with_status(422)
            .with_body(r#"{"detail": "value is not a valid email address"}"#)
            .create_async()
            .await;

        let slot = MemorySlot::default();
        let manager = manager(&server, &slot);
        let registration = |username: &str| Registration {
            username: username.to_string(),
            email: format!("{}@example.com", username),
            display_name: None,
            password: "s3cret-pw".to_string(),
        };

        assert_eq!(
            manager.signup(&registration("alice")).await.unwrap_err(),
            Error::DuplicateUsername
        );
        assert!(matches!(
            manager.signup(&registration("bob")).await.unwrap_err(),
            Error::ValidationError(_)
        ));
        assert!(manager.session().is_none());
    }
}
