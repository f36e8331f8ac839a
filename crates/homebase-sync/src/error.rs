//! Error types for the sync crate.

use homebase_auth::AuthError;
use homebase_store::StoreError;

/// Errors surfaced to callers of repository commands.
///
/// Gate misses on `fetch` are not errors; they return `Ok(())`.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// A write command was issued while logged out.
    #[error("no access token is stored; log in first")]
    MissingToken,

    /// A write command was issued with no address selected.
    #[error("no address is selected")]
    NoAddressSelected,

    /// The HTTP request could not be completed.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The server answered with an error status.
    #[error("remote error ({status}): {message}")]
    Remote { status: u16, message: String },

    /// The server's answer did not have the expected shape.
    #[error("unexpected response: {reason}")]
    Decode { reason: String },

    /// The feature has no endpoint for this operation.
    #[error("{feature} does not support {operation}")]
    Unsupported {
        feature: &'static str,
        operation: &'static str,
    },

    /// Configuration is missing or malformed.
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    /// Local persistence failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Authentication failed.
    #[error("auth error: {0}")]
    Auth(AuthError),
}

impl From<AuthError> for SyncError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MissingToken => Self::MissingToken,
            other => Self::Auth(other),
        }
    }
}

impl SyncError {
    /// Whether the failure happened talking to the server.
    pub fn is_network(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Remote { .. } | Self::Decode { .. })
    }
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, SyncError>;
