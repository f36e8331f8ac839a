//! Error types for the auth crate.
//!
//! Only operations that genuinely fail for the caller surface an
//! [`AuthError`]: asking for a token that is not there and the OAuth code
//! exchange.  State-store persistence failures are handled inside the
//! stores and never reach callers.

/// Unified error type for the Homebase auth crate.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// A token was required but none is stored.
    #[error("no access token is stored; log in first")]
    MissingToken,

    /// The authorization code exchange was rejected by the server.
    #[error("invalid grant: {reason}")]
    InvalidGrant {
        /// Explanation from the authorization server.
        reason: String,
    },

    /// An HTTP request to the authorization server failed.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// OAuth configuration is missing or malformed.
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// What is wrong with the configuration.
        reason: String,
    },

    /// The `state` returned by the authorization server does not match.
    #[error("oauth state mismatch")]
    StateMismatch,

    /// The system random source failed.
    #[error("random generation failed")]
    Random,

    /// URL parsing error.
    #[error("url parse error: {0}")]
    UrlParse(#[from] url::ParseError),
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, AuthError>;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_missing_token() {
        assert_eq!(
            AuthError::MissingToken.to_string(),
            "no access token is stored; log in first"
        );
    }

    #[test]
    fn error_display_invalid_grant() {
        let err = AuthError::InvalidGrant {
            reason: "bad code".to_string(),
        };
        assert_eq!(err.to_string(), "invalid grant: bad code");
    }

    #[test]
    fn error_display_invalid_config() {
        let err = AuthError::InvalidConfig {
            reason: "missing client_id".to_string(),
        };
        assert_eq!(err.to_string(), "invalid configuration: missing client_id");
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<AuthError>();
    }
}
