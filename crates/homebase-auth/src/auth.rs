//! Access-token state.
//!
//! [`AuthStateStore`] owns the access token.  The logged-in flag is derived
//! from the token on every read, so the two can never disagree.  Changes
//! are announced on two channels:
//!
//! - login state (`bool`, replays the current value to new subscribers)
//! - logout events (`()`, fires once per logged-in → logged-out transition,
//!   never replayed)
//!
//! The token is persisted through a [`SecureStore`].  Persistence failures
//! are logged and otherwise ignored: the in-memory token stays the source of
//! truth for the running process.

use std::sync::{Arc, Mutex, PoisonError};

use homebase_kernel::{BroadcastChannel, Subscription};
use homebase_vault::SecureStore;
use tracing::{debug, info, warn};

use crate::error::{AuthError, Result};

/// Secure-store key under which the access token is kept.
pub const ACCESS_TOKEN_KEY: &str = "homebase.access_token";

/// Single-writer holder of the access token.
pub struct AuthStateStore {
    secure: Arc<dyn SecureStore>,
    token: Mutex<Option<String>>,
    login_state: BroadcastChannel<bool>,
    logout_events: BroadcastChannel<()>,
}

impl AuthStateStore {
    /// Restore the token from `secure`.
    ///
    /// A read failure is logged and leaves the store logged out.
    pub fn load(secure: Arc<dyn SecureStore>) -> Self {
        let token = match secure.read(ACCESS_TOKEN_KEY) {
            Ok(token) => token,
            Err(e) => {
                warn!(error = %e, "failed to restore access token, starting logged out");
                None
            }
        };
        debug!(logged_in = token.is_some(), "auth state restored");

        Self {
            login_state: BroadcastChannel::new(token.is_some()),
            logout_events: BroadcastChannel::events(),
            token: Mutex::new(token),
            secure,
        }
    }

    /// Replace the access token.
    ///
    /// `None` logs out.  The login-state channel publishes only when the
    /// logged-in flag flips; the logout channel fires only when a present
    /// token is replaced by `None`.  Rotating one token for another
    /// publishes nothing.
    pub fn set_access_token(&self, token: Option<String>) {
        let mut current = self.token.lock().unwrap_or_else(PoisonError::into_inner);

        let persisted = match &token {
            Some(value) => self.secure.write(ACCESS_TOKEN_KEY, value),
            None => self.secure.delete(ACCESS_TOKEN_KEY),
        };
        if let Err(e) = persisted {
            warn!(error = %e, "failed to persist access token; change applies to this process only");
        }

        let was_logged_in = current.is_some();
        *current = token;
        let logged_in = current.is_some();

        // Publish while still holding the token lock so concurrent callers'
        // notifications stay in mutation order.
        if self.login_state.publish_if_changed(logged_in) {
            info!(logged_in, "login state changed");
        }
        if was_logged_in && !logged_in {
            self.logout_events.publish(());
        }
    }

    /// Log out.  Same as `set_access_token(None)`.
    pub fn clear(&self) {
        self.set_access_token(None);
    }

    pub fn access_token(&self) -> Option<String> {
        self.token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The token, or [`AuthError::MissingToken`].
    pub fn require_access_token(&self) -> Result<String> {
        self.access_token().ok_or(AuthError::MissingToken)
    }

    pub fn is_logged_in(&self) -> bool {
        self.token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Login-state updates, starting with the current state.
    pub fn observe_login_state(&self) -> Subscription<bool> {
        self.login_state.subscribe()
    }

    /// One `()` per logout, from now on.
    pub fn observe_logout_events(&self) -> Subscription<()> {
        self.logout_events.subscribe()
    }
}

impl std::fmt::Debug for AuthStateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthStateStore")
            .field("logged_in", &self.is_logged_in())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
