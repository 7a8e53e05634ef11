//! One-time `state` values for pending OAuth links.
//!
//! A link is begun and completed by two separate invocations when the front
//! end is a CLI, so the table can be mirrored to a sealed file in the
//! context data directory.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::Result;
use crate::models::{PrincipalId, ServiceType};
use crate::vault;

/// How long a link may stay pending (10 minutes).
pub const STATE_EXPIRY_SECS: i64 = 600;

const LINKS_FILE: &str = "links.sealed";

/// A link started by `begin_link` and not yet completed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PendingLink {
    pub owner: PrincipalId,
    pub service_type: ServiceType,
    pub created_at: DateTime<Utc>,
}

type Table = HashMap<String, PendingLink>;

struct Persistence {
    path: PathBuf,
    passphrase: String,
}

/// Pending OAuth states with expiration. Clones share the same table.
#[derive(Clone)]
pub struct StateManager {
    states: Arc<Mutex<Table>>,
    persistence: Option<Arc<Persistence>>,
    expiry_duration: Duration,
}

impl Default for StateManager {
    fn default() -> Self {
        Self::new(STATE_EXPIRY_SECS)
    }
}

impl StateManager {
    pub fn new(expiry_seconds: i64) -> Self {
        Self {
            states: Arc::new(Mutex::new(HashMap::new())),
            persistence: None,
            expiry_duration: Duration::try_seconds(expiry_seconds)
                .unwrap_or_else(|| Duration::seconds(STATE_EXPIRY_SECS)),
        }
    }

    /// A table mirrored to a sealed file in `data_dir`. Links still pending
    /// from an earlier run are loaded; expired ones are dropped.
    pub fn persistent(data_dir: PathBuf, passphrase: impl Into<String>) -> Result<Self> {
        let persistence = Persistence {
            path: data_dir.join(LINKS_FILE),
            passphrase: passphrase.into(),
        };
        let loaded: Table =
            vault::read_sealed(&persistence.path, &persistence.passphrase)?.unwrap_or_default();

        let manager = Self {
            persistence: Some(Arc::new(persistence)),
            ..Self::default()
        };
        {
            let mut states = manager.lock();
            *states = loaded;
            manager.retain_fresh(&mut states);
            debug!(count = states.len(), "Loaded pending OAuth links");
        }
        Ok(manager)
    }

    fn lock(&self) -> MutexGuard<'_, Table> {
        self.states.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn persist(&self, states: &Table) {
        let Some(ref persistence) = self.persistence else {
            return;
        };
        if let Err(e) = vault::write_sealed(&persistence.path, states, &persistence.passphrase) {
            warn!(error = %e, "Failed to persist pending OAuth links");
        }
    }

    fn is_expired(&self, entry: &PendingLink, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(entry.created_at) > self.expiry_duration
    }

    fn retain_fresh(&self, states: &mut Table) {
        let now = Utc::now();
        states.retain(|_, entry| !self.is_expired(entry, now));
    }

    /// Generate a new state (UUID v4) and remember it.
    pub fn create_state(&self, owner: PrincipalId, service_type: ServiceType) -> String {
        let state = Uuid::new_v4().to_string();
        self.remember(&state, owner, service_type);
        state
    }

    /// Remember a state issued elsewhere (by the backend).
    pub fn remember(&self, state: &str, owner: PrincipalId, service_type: ServiceType) {
        let entry = PendingLink {
            owner,
            service_type,
            created_at: Utc::now(),
        };
        let mut states = self.lock();
        self.retain_fresh(&mut states);
        states.insert(state.to_string(), entry);
        self.persist(&states);
    }

    /// Validate and consume a state. The entry is removed whether or not it
    /// has expired.
    pub fn validate_and_consume(&self, state: &str) -> Option<PendingLink> {
        let mut states = self.lock();
        let entry = states.remove(state)?;
        self.persist(&states);
        if self.is_expired(&entry, Utc::now()) {
            return None;
        }
        Some(entry)
    }

    pub fn cleanup_expired(&self) {
        let mut states = self.lock();
        let before = states.len();
        self.retain_fresh(&mut states);
        if states.len() != before {
            self.persist(&states);
        }
    }

    pub fn clear(&self) {
        let mut states = self.lock();
        states.clear();
        self.persist(&states);
    }

    pub fn count(&self) -> usize {
        self.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_create_and_validate_state() {
        let manager = StateManager::default();
        let state = manager.create_state(7, ServiceType::DocumentStore);
        assert!(!state.is_empty());

        let entry = manager.validate_and_consume(&state).unwrap();
        assert_eq!(entry.owner, 7);
        assert_eq!(entry.service_type, ServiceType::DocumentStore);
    }

    #[test]
    fn test_state_is_single_use() {
        let manager = StateManager::default();
        let state = manager.create_state(7, ServiceType::DocumentStore);

        assert!(manager.validate_and_consume(&state).is_some());
        assert!(manager.validate_and_consume(&state).is_none());
    }

    #[test]
    fn test_unknown_state_rejected() {
        let manager = StateManager::default();
        assert!(manager.validate_and_consume("invalid_state").is_none());
    }

    #[test]
    fn test_expired_state_rejected_and_removed() {
        let manager = StateManager::new(-1);
        manager.remember("s1", 7, ServiceType::DocumentStore);
        assert_eq!(manager.count(), 1);

        assert!(manager.validate_and_consume("s1").is_none());
        assert_eq!(manager.count(), 0);
    }

    #[test]
    fn test_cleanup_and_clear() {
        let expired = StateManager::new(-1);
        expired.remember("a", 1, ServiceType::DocumentStore);
        expired.cleanup_expired();
        assert_eq!(expired.count(), 0);

        let manager = StateManager::default();
        manager.create_state(1, ServiceType::DocumentStore);
        manager.create_state(2, ServiceType::DocumentStore);
        assert_eq!(manager.count(), 2);
        manager.clear();
        assert_eq!(manager.count(), 0);
    }

    #[test]
    fn test_persistent_links_survive_reopen() {
        let temp = TempDir::new().unwrap();
        let first = StateManager::persistent(temp.path().to_path_buf(), "pw").unwrap();
        first.remember("st-1", 7, ServiceType::DocumentStore);
        let minted = first.create_state(7, ServiceType::DocumentStore);
        drop(first);

        let second = StateManager::persistent(temp.path().to_path_buf(), "pw").unwrap();
        assert_eq!(second.count(), 2);
        let link = second.validate_and_consume("st-1").unwrap();
        assert_eq!(link.owner, 7);
        assert_eq!(link.service_type, ServiceType::DocumentStore);

        let third = StateManager::persistent(temp.path().to_path_buf(), "pw").unwrap();
        assert!(third.validate_and_consume("st-1").is_none());
        assert!(third.validate_and_consume(&minted).is_some());
    }

    #[test]
    fn test_persistent_links_need_the_same_passphrase() {
        let temp = TempDir::new().unwrap();
        StateManager::persistent(temp.path().to_path_buf(), "pw")
            .unwrap()
            .remember("st-1", 7, ServiceType::DocumentStore);

        assert!(StateManager::persistent(temp.path().to_path_buf(), "other").is_err());
    }

    #[test]
    fn test_clear_empties_persisted_table() {
        let temp = TempDir::new().unwrap();
        let manager = StateManager::persistent(temp.path().to_path_buf(), "pw").unwrap();
        manager.remember("st-1", 7, ServiceType::DocumentStore);
        manager.clear();

        let reopened = StateManager::persistent(temp.path().to_path_buf(), "pw").unwrap();
        assert_eq!(reopened.count(), 0);
    }
}
