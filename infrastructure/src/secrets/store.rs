use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

const NONCE_LEN: usize = 12;

#[derive(Error, Debug)]
pub enum SecretsError {
    #[error("Secret store passphrase not set (expected in ${0})")]
    MissingPassphrase(String),

    #[error("Secret store {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Secret store is corrupt or the passphrase is wrong")]
    Decrypt,

    #[error("Secret store encryption failed")]
    Encrypt,

    #[error("Secret store payload is not valid JSON: {0}")]
    Payload(#[from] serde_json::Error),
}

/// A file holding a `{alias: value}` JSON map sealed with AES-256-GCM.
///
/// Layout on disk is `nonce (12 bytes) || ciphertext+tag`. The key is the
/// SHA-256 digest of the passphrase. Every write draws a fresh nonce.
pub struct SecretStore {
    path: PathBuf,
    cipher: Aes256Gcm,
}

impl SecretStore {
    pub fn new(path: impl Into<PathBuf>, passphrase: &str) -> Self {
        let key = Sha256::digest(passphrase.as_bytes());
        Self {
            path: path.into(),
            cipher: Aes256Gcm::new(&key),
        }
    }

    /// Open the store with the passphrase read from environment variable `var`.
    pub fn from_env(path: impl Into<PathBuf>, var: &str) -> Result<Self, SecretsError> {
        match std::env::var(var) {
            Ok(passphrase) if !passphrase.is_empty() => Ok(Self::new(path, &passphrase)),
            _ => Err(SecretsError::MissingPassphrase(var.to_string())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, SecretsError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let sealed = self
            .cipher
            .encrypt(&nonce, plaintext)
            .map_err(|_| SecretsError::Encrypt)?;
        let mut out = Vec::with_capacity(NONCE_LEN + sealed.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&sealed);
        Ok(out)
    }

    pub fn decrypt(&self, blob: &[u8]) -> Result<Vec<u8>, SecretsError> {
        if blob.len() < NONCE_LEN {
            return Err(SecretsError::Decrypt);
        }
        let (nonce, sealed) = blob.split_at(NONCE_LEN);
        self.cipher
            .decrypt(Nonce::from_slice(nonce), sealed)
            .map_err(|_| SecretsError::Decrypt)
    }

    fn load(&self) -> Result<BTreeMap<String, String>, SecretsError> {
        let blob = match fs::read(&self.path) {
            Ok(blob) => blob,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(source) => {
                return Err(SecretsError::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        };
        let plain = self.decrypt(&blob)?;
        Ok(serde_json::from_slice(&plain)?)
    }

    fn save(&self, map: &BTreeMap<String, String>) -> Result<(), SecretsError> {
        let io = |source| SecretsError::Io {
            path: self.path.clone(),
            source,
        };
        let blob = self.encrypt(&serde_json::to_vec(map)?)?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(io)?;
        }
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, blob).map_err(io)?;
        fs::rename(&tmp, &self.path).map_err(io)?;
        debug!(path = %self.path.display(), entries = map.len(), "Secret store saved");
        Ok(())
    }

    pub fn get(&self, alias: &str) -> Result<Option<String>, SecretsError> {
        Ok(self.load()?.remove(alias))
    }

    /// Aliases in sorted order. Values are never listed.
    pub fn list(&self) -> Result<Vec<String>, SecretsError> {
        Ok(self.load()?.into_keys().collect())
    }

    pub fn set(&self, alias: &str, value: &str) -> Result<(), SecretsError> {
        let mut map = self.load()?;
        map.insert(alias.to_string(), value.to_string());
        self.save(&map)
    }

    /// Returns whether the alias existed.
    pub fn remove(&self, alias: &str) -> Result<bool, SecretsError> {
        let mut map = self.load()?;
        if map.remove(alias).is_none() {
            return Ok(false);
        }
        self.save(&map)?;
        Ok(true)
    }
}
