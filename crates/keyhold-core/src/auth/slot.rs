//! Durable slots for the session credential pair.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{bail, Context, Result};
use keyring::Entry;

use super::session::SessionData;
use crate::config::TokenStorage;
use crate::vault;

/// Keyring service name; the entry user is the context name.
const KEYRING_SERVICE: &str = "keyhold";

const SESSION_FILE: &str = "session.json";
const SEALED_SESSION_FILE: &str = "session.sealed";

/// Storage for the single session of one client context.
pub trait TokenSlot: Send + Sync {
    fn load(&self) -> Result<Option<SessionData>>;
    fn store(&self, data: &SessionData) -> Result<()>;
    /// Remove the stored session. Clearing an empty slot succeeds.
    fn clear(&self) -> Result<()>;
}

fn remove_if_exists(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("Failed to remove {}", path.display())),
    }
}

/// Plain JSON file in the context data directory.
pub struct FileSlot {
    path: PathBuf,
}

impl FileSlot {
    pub fn new(dir: &Path) -> Self {
        Self {
            path: dir.join(SESSION_FILE),
        }
    }
}

impl TokenSlot for FileSlot {
    fn load(&self) -> Result<Option<SessionData>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read {}", self.path.display()))?;
        Ok(Some(serde_json::from_str(&contents)?))
    }

    fn store(&self, data: &SessionData) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(data)?;
        std::fs::write(&self.path, contents)?;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        remove_if_exists(&self.path)
    }
}

/// JSON file sealed with a passphrase.
pub struct SealedFileSlot {
    path: PathBuf,
    passphrase: String,
}

impl SealedFileSlot {
    pub fn new(dir: &Path, passphrase: impl Into<String>) -> Self {
        Self {
            path: dir.join(SEALED_SESSION_FILE),
            passphrase: passphrase.into(),
        }
    }
}

impl TokenSlot for SealedFileSlot {
    fn load(&self) -> Result<Option<SessionData>> {
        vault::read_sealed(&self.path, &self.passphrase)
    }

    fn store(&self, data: &SessionData) -> Result<()> {
        vault::write_sealed(&self.path, data, &self.passphrase)
    }

    fn clear(&self) -> Result<()> {
        remove_if_exists(&self.path)
    }
}

/// OS keychain entry, one per context.
pub struct KeyringSlot {
    context: String,
}

impl KeyringSlot {
    pub fn new(context: impl Into<String>) -> Self {
        Self {
            context: context.into(),
        }
    }

    fn entry(&self) -> Result<Entry> {
        Entry::new(KEYRING_SERVICE, &self.context).context("Failed to create keyring entry")
    }
}

impl TokenSlot for KeyringSlot {
    fn load(&self) -> Result<Option<SessionData>> {
        match self.entry()?.get_password() {
            Ok(secret) => Ok(Some(serde_json::from_str(&secret)?)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e).context("Failed to retrieve session from keychain"),
        }
    }

    fn store(&self, data: &SessionData) -> Result<()> {
        let secret = serde_json::to_string(data)?;
        self.entry()?
            .set_password(&secret)
            .context("Failed to store session in keychain")
    }

    fn clear(&self) -> Result<()> {
        match self.entry()?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e).context("Failed to delete session from keychain"),
        }
    }
}

/// In-process slot. Clones share the same storage.
#[derive(Clone, Default)]
pub struct MemorySlot {
    inner: Arc<Mutex<Option<SessionData>>>,
}

impl TokenSlot for MemorySlot {
    fn load(&self) -> Result<Option<SessionData>> {
        Ok(self.inner.lock().unwrap_or_else(|e| e.into_inner()).clone())
    }

    fn store(&self, data: &SessionData) -> Result<()> {
        *self.inner.lock().unwrap_or_else(|e| e.into_inner()) = Some(data.clone());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self.inner.lock().unwrap_or_else(|e| e.into_inner()) = None;
        Ok(())
    }
}

/// Build the slot selected by configuration.
pub fn open_slot(
    storage: TokenStorage,
    data_dir: &Path,
    context: &str,
    passphrase: Option<&str>,
) -> Result<Box<dyn TokenSlot>> {
    Ok(match storage {
        TokenStorage::File => Box::new(FileSlot::new(data_dir)),
        TokenStorage::Sealed => match passphrase {
            Some(p) if !p.is_empty() => Box::new(SealedFileSlot::new(data_dir, p)),
            _ => bail!("Sealed token storage requires a passphrase"),
        },
        TokenStorage::Keyring => Box::new(KeyringSlot::new(context)),
        TokenStorage::Memory => Box::new(MemorySlot::default()),
    })
}
