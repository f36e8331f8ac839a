//! SQLite-backed encrypted secret store.
//!
//! The [`Vault`] struct wraps a `rusqlite::Connection` and a [`MasterKey`].
//! Every secret is sealed with AES-256-GCM before it is written and opened
//! on read; the plaintext never touches disk.
//!
//! # Schema
//!
//! ```text
//! secrets(key TEXT PRIMARY KEY, ciphertext BLOB, nonce BLOB, updated_at INTEGER)
//! ```
//!
//! The schema is created on [`Vault::open`].

use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};

use crate::crypto::{self, MasterKey, Sealed};
use crate::error::{Result, VaultError};
use crate::secure::SecureStore;

// ---------------------------------------------------------------------------
// Vault
// ---------------------------------------------------------------------------

/// Encrypted secret vault backed by SQLite.
///
/// # Example
///
/// ```rust,no_run
/// # use homebase_vault::{MasterKey, SecureStore, Vault};
/// # fn example() -> homebase_vault::Result<()> {
/// let vault = Vault::open("data/vault.db", MasterKey::generate()?)?;
/// vault.write("access_token", "tok_123")?;
/// assert_eq!(vault.read("access_token")?.as_deref(), Some("tok_123"));
/// # Ok(())
/// # }
/// ```
pub struct Vault {
    conn: Mutex<Connection>,
    master_key: MasterKey,
}

impl Vault {
    /// Open (or create) a vault database at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Database`] if the database cannot be opened,
    /// or [`VaultError::MigrationFailed`] if schema setup fails.
    pub fn open(path: impl AsRef<std::path::Path>, master_key: MasterKey) -> Result<Self> {
        let path = path.as_ref();
        tracing::info!(path = %path.display(), "opening vault database");

        let conn = Connection::open(path)?;
        let vault = Self::with_connection(conn, master_key)?;

        tracing::info!("vault database ready");
        Ok(vault)
    }

    /// Open an in-memory vault (useful for testing).
    pub fn open_in_memory(master_key: MasterKey) -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?, master_key)
    }

    fn with_connection(conn: Connection, master_key: MasterKey) -> Result<Self> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA temp_store = MEMORY;",
        )?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS secrets (
                key        TEXT PRIMARY KEY,
                ciphertext BLOB NOT NULL,
                nonce      BLOB NOT NULL,
                updated_at INTEGER NOT NULL
            );",
        )
        .map_err(|e| VaultError::MigrationFailed {
            reason: e.to_string(),
        })?;

        Ok(Self {
            conn: Mutex::new(conn),
            master_key,
        })
    }

    /// Number of stored secrets.
    pub fn len(&self) -> Result<usize> {
        let count: i64 = self
            .conn()?
            .query_row("SELECT count(*) FROM secrets", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Whether the vault holds no secrets.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| VaultError::Internal(format!("mutex poisoned: {e}")))
    }
}

impl SecureStore for Vault {
    fn write(&self, key: &str, value: &str) -> Result<()> {
        let sealed = crypto::seal(value.as_bytes(), &self.master_key)?;

        self.conn()?.execute(
            "INSERT INTO secrets (key, ciphertext, nonce, updated_at) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(key) DO UPDATE SET
                ciphertext = excluded.ciphertext,
                nonce = excluded.nonce,
                updated_at = excluded.updated_at",
            params![
                key,
                sealed.ciphertext,
                sealed.nonce.as_slice(),
                Utc::now().timestamp()
            ],
        )?;

        tracing::debug!(key = key, "stored secret");
        Ok(())
    }

    fn read(&self, key: &str) -> Result<Option<String>> {
        let row: Option<(Vec<u8>, Vec<u8>)> = self
            .conn()?
            .query_row(
                "SELECT ciphertext, nonce FROM secrets WHERE key = ?1",
                params![key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let Some((ciphertext, nonce_bytes)) = row else {
            return Ok(None);
        };

        let nonce: [u8; crypto::NONCE_LEN] =
            nonce_bytes
                .as_slice()
                .try_into()
                .map_err(|_| VaultError::Decryption {
                    reason: format!(
                        "stored nonce is {} bytes, expected {}",
                        nonce_bytes.len(),
                        crypto::NONCE_LEN
                    ),
                })?;

        let plaintext = crypto::open(&Sealed { nonce, ciphertext }, &self.master_key)?;
        let value = String::from_utf8(plaintext).map_err(|_| VaultError::InvalidSecret {
            key: key.to_string(),
        })?;
        Ok(Some(value))
    }

    fn delete(&self, key: &str) -> Result<()> {
        let rows = self
            .conn()?
            .execute("DELETE FROM secrets WHERE key = ?1", params![key])?;
        tracing::debug!(key = key, removed = rows > 0, "deleted secret");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn test_vault() -> Vault {
        Vault::open_in_memory(MasterKey::generate().unwrap()).unwrap()
    }

    #[test]
    fn write_and_read_secret() {
        let vault = test_vault();
        vault.write("access_token", "tok_12345").unwrap();
        assert_eq!(
            vault.read("access_token").unwrap().as_deref(),
            Some("tok_12345")
        );
    }

    #[test]
    fn read_missing_returns_none() {
        let vault = test_vault();
        assert_eq!(vault.read("nothing").unwrap(), None);
    }

    #[test]
    fn write_overwrites_existing() {
        let vault = test_vault();
        vault.write("access_token", "old").unwrap();
        vault.write("access_token", "new").unwrap();

        assert_eq!(vault.read("access_token").unwrap().as_deref(), Some("new"));
        assert_eq!(vault.len().unwrap(), 1);
    }

    #[test]
    fn delete_removes_secret_and_is_idempotent() {
        let vault = test_vault();
        vault.write("access_token", "tok").unwrap();

        vault.delete("access_token").unwrap();
        assert_eq!(vault.read("access_token").unwrap(), None);
        assert!(vault.is_empty().unwrap());

        vault.delete("access_token").unwrap();
    }

    #[test]
    fn plaintext_is_not_stored() {
        let vault = test_vault();
        vault.write("access_token", "very-visible-token").unwrap();

        let raw: Vec<u8> = vault
            .conn()
            .unwrap()
            .query_row(
                "SELECT ciphertext FROM secrets WHERE key = 'access_token'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert!(
            !raw.windows(b"very-visible-token".len())
                .any(|w| w == b"very-visible-token")
        );
    }

    #[test]
    fn wrong_master_key_cannot_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vault.db");

        let vault = Vault::open(&path, MasterKey::generate().unwrap()).unwrap();
        vault.write("access_token", "tok").unwrap();
        drop(vault);

        let other = Vault::open(&path, MasterKey::generate().unwrap()).unwrap();
        assert!(matches!(
            other.read("access_token"),
            Err(VaultError::Decryption { .. })
        ));
    }

    #[test]
    fn vault_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Vault>();
    }
}
