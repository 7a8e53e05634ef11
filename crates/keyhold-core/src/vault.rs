//! Passphrase-sealed JSON files.
//!
//! A sealed file is a small JSON envelope holding a random salt, a random
//! nonce and the XChaCha20-Poly1305 ciphertext, all base64 encoded. The key
//! is derived from the passphrase with Argon2id.

use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use argon2::Argon2;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{XChaCha20Poly1305, XNonce};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

const ENVELOPE_VERSION: u8 = 1;
const SALT_SIZE: usize = 16;
const NONCE_SIZE: usize = 24;
const KEY_SIZE: usize = 32;

#[derive(Serialize, Deserialize)]
struct Envelope {
    version: u8,
    salt: String,
    nonce: String,
    ciphertext: String,
}

fn derive_key(passphrase: &str, salt: &[u8]) -> Result<[u8; KEY_SIZE]> {
    if passphrase.is_empty() {
        bail!("Passphrase must not be empty");
    }
    let mut key = [0u8; KEY_SIZE];
    Argon2::default()
        .hash_password_into(passphrase.as_bytes(), salt, &mut key)
        .map_err(|e| anyhow!("Key derivation failed: {}", e))?;
    Ok(key)
}

/// Serialize `value` and seal it under `passphrase`.
pub fn seal<T: Serialize>(value: &T, passphrase: &str) -> Result<String> {
    let plaintext = serde_json::to_vec(value)?;

    let mut salt = [0u8; SALT_SIZE];
    let mut nonce = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut salt);
    OsRng.fill_bytes(&mut nonce);

    let key = derive_key(passphrase, &salt)?;
    let cipher = XChaCha20Poly1305::new_from_slice(&key)
        .map_err(|e| anyhow!("Failed to create cipher: {}", e))?;
    let ciphertext = cipher
        .encrypt(XNonce::from_slice(&nonce), plaintext.as_ref())
        .map_err(|e| anyhow!("Encryption failed: {}", e))?;

    let envelope = Envelope {
        version: ENVELOPE_VERSION,
        salt: BASE64.encode(salt),
        nonce: BASE64.encode(nonce),
        ciphertext: BASE64.encode(ciphertext),
    };
    Ok(serde_json::to_string(&envelope)?)
}

/// Open a sealed envelope. Fails on a wrong passphrase or tampered data.
pub fn open<T: DeserializeOwned>(sealed: &str, passphrase: &str) -> Result<T> {
    let envelope: Envelope = serde_json::from_str(sealed).context("Malformed sealed file")?;
    if envelope.version != ENVELOPE_VERSION {
        bail!("Unsupported sealed file version {}", envelope.version);
    }

    let salt = BASE64.decode(&envelope.salt).context("Failed to decode salt")?;
    let nonce = BASE64.decode(&envelope.nonce).context("Failed to decode nonce")?;
    let ciphertext = BASE64
        .decode(&envelope.ciphertext)
        .context("Failed to decode ciphertext")?;
    if nonce.len() != NONCE_SIZE {
        bail!("Invalid nonce size: expected {}, got {}", NONCE_SIZE, nonce.len());
    }

    let key = derive_key(passphrase, &salt)?;
    let cipher = XChaCha20Poly1305::new_from_slice(&key)
        .map_err(|e| anyhow!("Failed to create cipher: {}", e))?;
    let plaintext = cipher
        .decrypt(XNonce::from_slice(&nonce), ciphertext.as_ref())
        .map_err(|_| anyhow!("Decryption failed (wrong passphrase or corrupted data)"))?;

    serde_json::from_slice(&plaintext).context("Sealed contents are not valid JSON")
}

pub fn write_sealed<T: Serialize>(path: &Path, value: &T, passphrase: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let sealed = seal(value, passphrase)?;
    std::fs::write(path, sealed).with_context(|| format!("Failed to write {}", path.display()))
}

/// Read a sealed file; a missing file reads as `None`.
pub fn read_sealed<T: DeserializeOwned>(path: &Path, passphrase: &str) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let sealed = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    open(&sealed, passphrase).map(Some)
}
