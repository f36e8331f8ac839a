//! Secure key-value storage interface.
//!
//! [`SecureStore`] is the only surface the rest of Homebase sees for secret
//! material.  [`Vault`](crate::Vault) is the persistent implementation;
//! [`MemorySecureStore`] keeps secrets for the lifetime of the process and
//! is what tests and ephemeral sessions use.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use crate::error::{Result, VaultError};

/// Abstraction over secure secret storage.
///
/// Implementations must be `Send + Sync` so the auth state store can hold
/// one behind an `Arc` and call it from any task.
pub trait SecureStore: Send + Sync {
    /// Store (or overwrite) the secret under `key`.
    fn write(&self, key: &str, value: &str) -> Result<()>;

    /// Read the secret under `key`, `None` if absent.
    fn read(&self, key: &str) -> Result<Option<String>>;

    /// Remove the secret under `key`.  Deleting a missing key is not an error.
    fn delete(&self, key: &str) -> Result<()>;
}

// ---------------------------------------------------------------------------
// In-memory implementation
// ---------------------------------------------------------------------------

/// Process-local [`SecureStore`].
///
/// Failure injection via [`set_unavailable`](Self::set_unavailable) makes
/// every operation return [`VaultError::KeychainUnavailable`], which lets
/// callers exercise their storage-failure paths.
#[derive(Debug, Default)]
pub struct MemorySecureStore {
    secrets: Mutex<HashMap<String, String>>,
    unavailable: AtomicBool,
}

impl MemorySecureStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Toggle simulated backend failure.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(VaultError::KeychainUnavailable {
                reason: "memory store marked unavailable".into(),
            });
        }
        Ok(())
    }
}

impl SecureStore for MemorySecureStore {
    fn write(&self, key: &str, value: &str) -> Result<()> {
        self.check_available()?;
        self.secrets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn read(&self, key: &str) -> Result<Option<String>> {
        self.check_available()?;
        Ok(self
            .secrets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned())
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.check_available()?;
        self.secrets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_read_delete() {
        let store = MemorySecureStore::new();
        assert_eq!(store.read("token").unwrap(), None);

        store.write("token", "abc").unwrap();
        assert_eq!(store.read("token").unwrap().as_deref(), Some("abc"));

        store.delete("token").unwrap();
        assert_eq!(store.read("token").unwrap(), None);
        store.delete("token").unwrap();
    }

    #[test]
    fn unavailable_store_fails_every_operation() {
        let store = MemorySecureStore::new();
        store.set_unavailable(true);

        assert!(store.write("k", "v").is_err());
        assert!(store.read("k").is_err());
        assert!(store.delete("k").is_err());

        store.set_unavailable(false);
        assert!(store.write("k", "v").is_ok());
    }
}
