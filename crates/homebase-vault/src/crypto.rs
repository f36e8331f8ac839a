//! AES-256-GCM sealing for secrets at rest, built on `ring`.
//!
//! - [`seal`] / [`open`] encrypt and decrypt a value under a [`MasterKey`]
//!   with a fresh random 96-bit nonce per call.
//! - [`MasterKey::generate`] draws a key from the system CSPRNG.
//! - [`MasterKey::derive`] stretches low-entropy material (device identity)
//!   into a key with PBKDF2-HMAC-SHA256.
//!
//! Secrets handled here are access tokens, so every value is small and the
//! nonce collision bound for random 96-bit nonces is never approached.

use std::num::NonZeroU32;

use ring::aead::{self, Aad, LessSafeKey, Nonce, UnboundKey};
use ring::pbkdf2;
use ring::rand::{SecureRandom, SystemRandom};

use crate::error::{Result, VaultError};

/// Length of an AES-256-GCM key in bytes.
pub const KEY_LEN: usize = 32;

/// Length of the AES-256-GCM nonce in bytes.
pub const NONCE_LEN: usize = aead::NONCE_LEN;

/// Length of the GCM authentication tag appended to every ciphertext.
pub const TAG_LEN: usize = 16;

/// PBKDF2 rounds used when deriving a key from device material.
const PBKDF2_ROUNDS: u32 = 100_000;

// ---------------------------------------------------------------------------
// Keys
// ---------------------------------------------------------------------------

/// A 256-bit key used to seal secrets.
#[derive(Clone, PartialEq, Eq)]
pub struct MasterKey([u8; KEY_LEN]);

impl MasterKey {
    /// Generate a fresh random key.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Internal`] if the system CSPRNG fails.
    pub fn generate() -> Result<Self> {
        let mut bytes = [0u8; KEY_LEN];
        SystemRandom::new()
            .fill(&mut bytes)
            .map_err(|_| VaultError::Internal("failed to generate random key".into()))?;
        Ok(Self(bytes))
    }

    /// Derive a key from `material` and `salt` with PBKDF2-HMAC-SHA256.
    pub fn derive(material: &[u8], salt: &[u8]) -> Self {
        let mut bytes = [0u8; KEY_LEN];
        let rounds = NonZeroU32::new(PBKDF2_ROUNDS).unwrap_or(NonZeroU32::MIN);
        pbkdf2::derive(pbkdf2::PBKDF2_HMAC_SHA256, rounds, salt, material, &mut bytes);
        Self(bytes)
    }

    /// Build a key from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Encryption`] if `bytes` is not [`KEY_LEN`] long.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let array: [u8; KEY_LEN] =
            bytes
                .try_into()
                .map_err(|_| VaultError::Encryption {
                    reason: format!("key must be {KEY_LEN} bytes, got {}", bytes.len()),
                })?;
        Ok(Self(array))
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    fn aead_key(&self) -> Result<LessSafeKey> {
        let unbound = UnboundKey::new(&aead::AES_256_GCM, &self.0).map_err(|_| {
            VaultError::Encryption {
                reason: "failed to create AES-256-GCM key".into(),
            }
        })?;
        Ok(LessSafeKey::new(unbound))
    }
}

impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("MasterKey(..)")
    }
}

// ---------------------------------------------------------------------------
// Sealing
// ---------------------------------------------------------------------------

/// An encrypted value together with the nonce it was sealed under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sealed {
    pub nonce: [u8; NONCE_LEN],
    /// Ciphertext with the GCM tag appended.
    pub ciphertext: Vec<u8>,
}

/// Encrypt `plaintext` under `key`.
///
/// # Errors
///
/// Returns [`VaultError::Encryption`] if nonce generation or sealing fails.
pub fn seal(plaintext: &[u8], key: &MasterKey) -> Result<Sealed> {
    let mut nonce = [0u8; NONCE_LEN];
    SystemRandom::new()
        .fill(&mut nonce)
        .map_err(|_| VaultError::Encryption {
            reason: "failed to generate random nonce".into(),
        })?;

    let mut in_out = plaintext.to_vec();
    key.aead_key()?
        .seal_in_place_append_tag(Nonce::assume_unique_for_key(nonce), Aad::empty(), &mut in_out)
        .map_err(|_| VaultError::Encryption {
            reason: "seal_in_place failed".into(),
        })?;

    Ok(Sealed {
        nonce,
        ciphertext: in_out,
    })
}

/// Decrypt a [`Sealed`] value under `key`.
///
/// # Errors
///
/// Returns [`VaultError::Decryption`] if the key is wrong or the data has
/// been tampered with.
pub fn open(sealed: &Sealed, key: &MasterKey) -> Result<Vec<u8>> {
    let mut in_out = sealed.ciphertext.clone();
    let plaintext = key
        .aead_key()?
        .open_in_place(
            Nonce::assume_unique_for_key(sealed.nonce),
            Aad::empty(),
            &mut in_out,
        )
        .map_err(|_| VaultError::Decryption {
            reason: "authentication failed: wrong key or corrupted data".into(),
        })?;
    Ok(plaintext.to_vec())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
