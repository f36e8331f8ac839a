//! File-based master key storage.
//!
//! The vault's [`MasterKey`] must never be stored as plaintext on disk.
//! [`FileKeychain`] seals it with a device-derived key (hostname, username
//! and an application salt run through PBKDF2) and writes the result to a
//! single file, restricted to mode 0600 on Unix.
//!
//! The device-derived key can be reconstructed by anyone with access to the
//! same machine account; it keeps the key out of backups and casual reads,
//! not away from a local attacker.

use std::path::{Path, PathBuf};

use crate::crypto::{self, MasterKey, Sealed};
use crate::error::{Result, VaultError};

/// Salt mixed into the device-derived key.  Changing this invalidates every
/// previously written key file.
const APP_SALT: &[u8] = b"homebase-keychain-v1";

/// File-based master key store.
///
/// File layout (binary):
/// ```text
/// [12 bytes: AES-256-GCM nonce]
/// [remaining: ciphertext of the 32-byte master key + 16-byte tag]
/// ```
#[derive(Debug, Clone)]
pub struct FileKeychain {
    key_file: PathBuf,
}

impl FileKeychain {
    /// Create a keychain that stores its key at `key_file`.
    pub fn new(key_file: impl Into<PathBuf>) -> Self {
        Self {
            key_file: key_file.into(),
        }
    }

    /// Default key file location: `<data_dir>/master.key`.
    pub fn default_path(data_dir: &Path) -> PathBuf {
        data_dir.join("master.key")
    }

    /// Path of the key file.
    pub fn path(&self) -> &Path {
        &self.key_file
    }

    /// Load the master key, generating and storing a new one on first run.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::KeychainUnavailable`] if an existing key file is
    /// corrupted or was written on another device, or [`VaultError::Io`] on
    /// filesystem failure.
    pub fn load_or_create(&self) -> Result<MasterKey> {
        if let Some(key) = self.load()? {
            return Ok(key);
        }

        let key = MasterKey::generate()?;
        self.store(&key)?;
        tracing::info!(path = %self.key_file.display(), "generated new master key");
        Ok(key)
    }

    /// Load the master key, `None` if no key file exists yet.
    pub fn load(&self) -> Result<Option<MasterKey>> {
        if !self.key_file.exists() {
            return Ok(None);
        }

        let data = std::fs::read(&self.key_file)?;
        if data.len() < crypto::NONCE_LEN + crypto::TAG_LEN {
            return Err(VaultError::KeychainUnavailable {
                reason: "master key file is too small / corrupted".into(),
            });
        }

        let (nonce_bytes, ciphertext) = data.split_at(crypto::NONCE_LEN);
        let mut nonce = [0u8; crypto::NONCE_LEN];
        nonce.copy_from_slice(nonce_bytes);

        let sealed = Sealed {
            nonce,
            ciphertext: ciphertext.to_vec(),
        };
        let raw = crypto::open(&sealed, &Self::device_key()).map_err(|e| {
            VaultError::KeychainUnavailable {
                reason: format!("cannot unseal master key: {e}"),
            }
        })?;

        tracing::debug!("retrieved master key from file keychain");
        MasterKey::from_bytes(&raw).map(Some)
    }

    /// Seal `key` with the device key and write it to the key file.
    pub fn store(&self, key: &MasterKey) -> Result<()> {
        let sealed = crypto::seal(key.as_bytes(), &Self::device_key())?;

        let mut data = Vec::with_capacity(crypto::NONCE_LEN + sealed.ciphertext.len());
        data.extend_from_slice(&sealed.nonce);
        data.extend_from_slice(&sealed.ciphertext);

        if let Some(parent) = self.key_file.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.key_file, &data)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.key_file, std::fs::Permissions::from_mode(0o600))?;
        }

        tracing::info!(path = %self.key_file.display(), "stored master key in file keychain");
        Ok(())
    }

    /// Remove the key file, making every secret sealed under it unreadable.
    pub fn delete(&self) -> Result<()> {
        if self.key_file.exists() {
            std::fs::remove_file(&self.key_file)?;
            tracing::info!(path = %self.key_file.display(), "deleted master key file");
        }
        Ok(())
    }

    fn device_key() -> MasterKey {
        let username = std::env::var("USER")
            .or_else(|_| std::env::var("USERNAME"))
            .unwrap_or_else(|_| "unknown-user".into());
        let material = format!("{}:{}", Self::hostname(), username);
        MasterKey::derive(material.as_bytes(), APP_SALT)
    }

    fn hostname() -> String {
        #[cfg(unix)]
        {
            std::fs::read_to_string("/etc/hostname")
                .map(|s| s.trim().to_string())
                .or_else(|_| std::env::var("HOSTNAME"))
                .unwrap_or_else(|_| "unknown-host".into())
        }

        #[cfg(not(unix))]
        {
            std::env::var("COMPUTERNAME").unwrap_or_else(|_| "unknown-host".into())
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
