//! Per-principal credential records.
//!
//! One record per (owner, service type). Every save bumps the record's
//! generation; a verdict computed against an older generation is dropped
//! by `record_verdict`, so a save made during a test always wins.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::models::{CredentialRecord, PrincipalId, SecretPayload, ServiceType, TestStatus, Verdict};
use crate::vault;

const CREDENTIALS_FILE: &str = "credentials.sealed";

type Key = (PrincipalId, ServiceType);

struct Entry {
    record: CredentialRecord,
    generation: u64,
}

/// Sealed file the credential set is mirrored to.
struct Persistence {
    path: PathBuf,
    passphrase: String,
}

#[derive(Default)]
struct State {
    entries: HashMap<Key, Entry>,
    next_generation: u64,
}

#[derive(Default)]
pub struct CredentialStore {
    state: RwLock<State>,
    persistence: Option<Persistence>,
}

impl CredentialStore {
    /// A store that lives only in memory.
    pub fn new() -> Self {
        Self::default()
    }

    /// A store mirrored to a sealed file in `data_dir`. Existing records are
    /// loaded immediately.
    pub fn persistent(data_dir: PathBuf, passphrase: impl Into<String>) -> Result<Self> {
        let store = Self {
            state: RwLock::new(State::default()),
            persistence: Some(Persistence {
                path: data_dir.join(CREDENTIALS_FILE),
                passphrase: passphrase.into(),
            }),
        };
        store.load()?;
        Ok(store)
    }

    fn read(&self) -> RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Create or replace the record for (owner, service type). The new
    /// record is `pending` with no test history.
    pub fn save(
        &self,
        owner: PrincipalId,
        service_type: ServiceType,
        payload: SecretPayload,
    ) -> Result<CredentialRecord> {
        service_type
            .validate_payload(&payload)
            .map_err(Error::ValidationError)?;

        let record = CredentialRecord {
            owner,
            service_type: service_type.clone(),
            payload,
            test_status: TestStatus::Pending,
            last_tested_at: None,
            test_message: None,
            updated_at: Utc::now(),
        };

        let mut state = self.write();
        state.next_generation += 1;
        let generation = state.next_generation;
        state.entries.insert(
            (owner, service_type.clone()),
            Entry {
                record: record.clone(),
                generation,
            },
        );
        self.persist(&state);
        debug!(owner = owner, service = %service_type, generation = generation, "Credential saved");
        Ok(record)
    }

    /// All records of `owner`, sorted by service type wire name.
    pub fn list(&self, owner: PrincipalId) -> Vec<CredentialRecord> {
        let state = self.read();
        let mut records: Vec<CredentialRecord> = state
            .entries
            .iter()
            .filter(|((o, _), _)| *o == owner)
            .map(|(_, entry)| entry.record.clone())
            .collect();
        records.sort_by(|a, b| a.service_type.as_str().cmp(b.service_type.as_str()));
        records
    }

    pub fn get(&self, owner: PrincipalId, service_type: &ServiceType) -> Option<CredentialRecord> {
        self.snapshot(owner, service_type).map(|(record, _)| record)
    }

    /// The record together with its current generation.
    pub fn snapshot(
        &self,
        owner: PrincipalId,
        service_type: &ServiceType,
    ) -> Option<(CredentialRecord, u64)> {
        self.read()
            .entries
            .get(&(owner, service_type.clone()))
            .map(|entry| (entry.record.clone(), entry.generation))
    }

    /// Apply a test outcome if the record is still at `generation`.
    /// Returns whether the verdict was applied. The payload is untouched.
    pub fn record_verdict(
        &self,
        owner: PrincipalId,
        service_type: &ServiceType,
        generation: u64,
        verdict: &Verdict,
    ) -> bool {
        let mut state = self.write();
        let entry = match state.entries.get_mut(&(owner, service_type.clone())) {
            Some(entry) if entry.generation == generation => entry,
            _ => {
                debug!(owner = owner, service = %service_type, "Discarding stale verdict");
                return false;
            }
        };
        entry.record.test_status = verdict.test_status();
        entry.record.last_tested_at = Some(verdict.tested_at);
        entry.record.test_message = Some(verdict.message.clone());
        self.persist(&state);
        true
    }

    /// Drop every record. Verdicts still in flight are discarded.
    pub fn clear(&self) {
        let mut state = self.write();
        state.entries.clear();
        state.next_generation += 1;
        self.persist(&state);
    }

    pub fn len(&self) -> usize {
        self.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reload records from the sealed file, if configured.
    pub fn load(&self) -> Result<()> {
        let Some(ref persistence) = self.persistence else {
            return Ok(());
        };
        let records: Vec<CredentialRecord> =
            vault::read_sealed(&persistence.path, &persistence.passphrase)?.unwrap_or_default();

        let mut state = self.write();
        state.entries.clear();
        for record in records {
            state.next_generation += 1;
            let generation = state.next_generation;
            state.entries.insert(
                (record.owner, record.service_type.clone()),
                Entry { record, generation },
            );
        }
        debug!(count = state.entries.len(), "Loaded credential records");
        Ok(())
    }

    fn persist(&self, state: &State) {
        let Some(ref persistence) = self.persistence else {
            return;
        };
        let records: Vec<&CredentialRecord> = state.entries.values().map(|e| &e.record).collect();
        if let Err(e) = vault::write_sealed(&persistence.path, &records, &persistence.passphrase) {
            warn!(error = %e, "Failed to persist credential records");
        }
    }
}
