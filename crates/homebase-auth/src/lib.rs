//! Authentication and session state for Homebase.
//!
//! Two single-writer stores hold everything the rest of the app needs to
//! know about who is signed in:
//!
//! ```text
//! AuthStateStore      access token (SecureStore)
//! ├── login state     BroadcastChannel<bool>, replays current
//! └── logout events   BroadcastChannel<()>, events only
//!
//! SessionStateStore   account + selected address (Archive each)
//! ├── account         BroadcastChannel<Account>
//! ├── address         BroadcastChannel<Address>
//! └── session         BroadcastChannel<Session>, composed projection
//! ```
//!
//! [`OAuthFlow`] obtains a token through the authorization code flow.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use homebase_auth::{AuthStateStore, CurrentAccount, SessionStateStore};
//! use homebase_store::MemoryArchive;
//! use homebase_vault::MemorySecureStore;
//!
//! # async fn example() {
//! let auth = AuthStateStore::load(Arc::new(MemorySecureStore::new()));
//! let session = SessionStateStore::load(
//!     Arc::new(MemoryArchive::<CurrentAccount>::new()),
//!     Arc::new(MemoryArchive::<String>::new()),
//! )
//! .await;
//!
//! let mut login = auth.observe_login_state();
//! assert_eq!(login.recv().await, Some(false));
//! auth.set_access_token(Some("token".into()));
//! assert_eq!(login.recv().await, Some(true));
//! # let _ = session;
//! # }
//! ```

pub mod account;
pub mod auth;
pub mod error;
pub mod oauth;
pub mod session;

// Re-export key types at the crate root for convenience.
pub use account::{Account, AccountAddress, Address, CurrentAccount, Session};
pub use auth::{ACCESS_TOKEN_KEY, AuthStateStore};
pub use error::{AuthError, Result};
pub use oauth::{OAuthConfig, OAuthFlow, generate_state, verify_state};
pub use session::SessionStateStore;
