//! Encrypted secret storage for Homebase.
//!
//! This crate owns every secret the client persists (today: the API access
//! token).  Secrets are sealed with AES-256-GCM under a master key, and the
//! master key itself is sealed with a device-derived key on disk.
//!
//! # Modules
//!
//! - [`secure`] -- the [`SecureStore`] interface and an in-memory store.
//! - [`store`] -- [`Vault`], the SQLite-backed encrypted [`SecureStore`].
//! - [`keychain`] -- [`FileKeychain`], master key persistence.
//! - [`crypto`] -- sealing primitives.
//! - [`error`] -- unified error types.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use homebase_vault::{FileKeychain, SecureStore, Vault};
//!
//! # fn example() -> homebase_vault::Result<()> {
//! let keychain = FileKeychain::new("data/master.key");
//! let vault = Vault::open("data/vault.db", keychain.load_or_create()?)?;
//!
//! vault.write("access_token", "tok_123")?;
//! let token = vault.read("access_token")?;
//! # Ok(())
//! # }
//! ```

pub mod crypto;
pub mod error;
pub mod keychain;
pub mod secure;
pub mod store;

pub use crypto::MasterKey;
pub use error::{Result, VaultError};
pub use keychain::FileKeychain;
pub use secure::{MemorySecureStore, SecureStore};
pub use store::Vault;
