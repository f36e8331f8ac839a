//! Vault error types.
//!
//! All vault subsystems surface errors through [`VaultError`], the single
//! error type returned by every public API in this crate.

/// Unified error type for the Homebase secret vault.
#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    // -- Crypto errors ------------------------------------------------------
    /// Sealing a secret failed (bad key length, CSPRNG failure).
    #[error("encryption failed: {reason}")]
    Encryption { reason: String },

    /// Opening a sealed secret failed (wrong key, corrupted ciphertext).
    #[error("decryption failed: {reason}")]
    Decryption { reason: String },

    // -- Keychain errors ----------------------------------------------------
    /// The master key file exists but cannot be used.
    #[error("keychain unavailable: {reason}")]
    KeychainUnavailable { reason: String },

    // -- Store errors -------------------------------------------------------
    /// A stored secret is not valid UTF-8 after decryption.
    #[error("secret `{key}` is not valid UTF-8")]
    InvalidSecret { key: String },

    /// The vault database could not be prepared.
    #[error("migration failed: {reason}")]
    MigrationFailed { reason: String },

    // -- Underlying errors --------------------------------------------------
    /// SQLite error from `rusqlite`.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// I/O error from the filesystem (keychain file operations).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    // -- Generic ------------------------------------------------------------
    /// Catch-all for unexpected internal errors.
    #[error("internal vault error: {0}")]
    Internal(String),
}

/// Convenience alias used throughout the vault crate.
pub type Result<T> = std::result::Result<T, VaultError>;
