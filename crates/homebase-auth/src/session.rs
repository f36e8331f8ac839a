//! Account and address state.
//!
//! [`SessionStateStore`] owns the synchronized [`Account`] and the selected
//! [`Address`], persists each through its own [`Archive`], and announces
//! changes on three replaying channels: account, address, and the composed
//! [`Session`].
//!
//! Mutations are serialized by one async lock held across the archive write
//! and the publishes, so subscribers always see changes in the order they
//! were made.  A failed archive write resets the affected state to empty
//! rather than keeping something that would not survive a restart.

use std::sync::Arc;

use homebase_kernel::{BroadcastChannel, Subscription};
use homebase_store::Archive;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::account::{Account, Address, CurrentAccount, Session};

#[derive(Debug, Default)]
struct SessionState {
    account: Account,
    address: Address,
}

/// Single-writer holder of the account and selected address.
pub struct SessionStateStore {
    account_archive: Arc<dyn Archive<CurrentAccount>>,
    address_archive: Arc<dyn Archive<String>>,
    state: Mutex<SessionState>,
    account: BroadcastChannel<Account>,
    address: BroadcastChannel<Address>,
    session: BroadcastChannel<Session>,
}

impl SessionStateStore {
    /// Restore account and address from their archives.
    ///
    /// Each piece is restored independently; one that fails to load starts
    /// empty without affecting the other.
    pub async fn load(
        account_archive: Arc<dyn Archive<CurrentAccount>>,
        address_archive: Arc<dyn Archive<String>>,
    ) -> Self {
        let account = match account_archive.load().await {
            Ok(Some(account)) => Account::Present(account),
            Ok(None) => Account::NotSynchronized,
            Err(e) => {
                warn!(error = %e, "failed to restore account");
                Account::NotSynchronized
            }
        };
        let address = match address_archive.load().await {
            Ok(Some(address)) => Address::Selected(address),
            Ok(None) => Address::NotSet,
            Err(e) => {
                warn!(error = %e, "failed to restore selected address");
                Address::NotSet
            }
        };
        debug!(
            account = account.as_present().map(CurrentAccount::name),
            address = %address,
            "session state restored"
        );

        Self {
            session: BroadcastChannel::new(Session::compose(&account, &address)),
            account: BroadcastChannel::new(account.clone()),
            address: BroadcastChannel::new(address.clone()),
            state: Mutex::new(SessionState { account, address }),
            account_archive,
            address_archive,
        }
    }

    /// Store a freshly synchronized account.
    ///
    /// If no address is selected yet, the account's first address is
    /// selected, published after the account itself.  An existing selection
    /// is kept even when the new account no longer lists it.
    pub async fn set_current_account(&self, account: CurrentAccount) {
        let mut state = self.state.lock().await;

        if let Err(e) = self.account_archive.save(&account).await {
            warn!(error = %e, "failed to persist account, resetting session");
            self.reset(&mut state).await;
            return;
        }

        info!(account = account.name(), addresses = account.addresses().len(), "account updated");
        let first = account.first_address().map(String::from);
        state.account = Account::Present(account);
        self.account.publish(state.account.clone());
        self.publish_session(&state);

        if let Some(first) = first.filter(|_| !state.address.is_set()) {
            debug!(address = %first, "selecting first address");
            self.select(&mut state, first).await;
        }
    }

    /// Select `address`.  A failed write clears the selection only.
    pub async fn set_selected_address(&self, address: impl Into<String>) {
        let mut state = self.state.lock().await;
        self.select(&mut state, address.into()).await;
    }

    /// Forget account and address.  Idempotent.
    pub async fn clear_session(&self) {
        let mut state = self.state.lock().await;
        self.reset(&mut state).await;
        info!("session cleared");
    }

    pub fn account(&self) -> Account {
        self.account.current().unwrap_or_default()
    }

    pub fn address(&self) -> Address {
        self.address.current().unwrap_or_default()
    }

    pub fn session(&self) -> Session {
        self.session.current().unwrap_or_default()
    }

    pub fn observe_account(&self) -> Subscription<Account> {
        self.account.subscribe()
    }

    pub fn observe_address(&self) -> Subscription<Address> {
        self.address.subscribe()
    }

    pub fn observe_session(&self) -> Subscription<Session> {
        self.session.subscribe()
    }

    // -- internals ----------------------------------------------------------

    async fn select(&self, state: &mut SessionState, address: String) {
        match self.address_archive.save(&address).await {
            Ok(()) => {
                info!(address = %address, "address selected");
                state.address = Address::Selected(address);
                self.address.publish(state.address.clone());
            }
            Err(e) => {
                warn!(address = %address, error = %e, "failed to persist selected address, clearing it");
                if let Err(e) = self.address_archive.clear().await {
                    warn!(error = %e, "failed to clear address archive");
                }
                state.address = Address::NotSet;
                self.address.publish(Address::NotSet);
            }
        }
        self.publish_session(state);
    }

    /// Clear both pieces in memory and in the archives.
    async fn reset(&self, state: &mut SessionState) {
        if let Err(e) = self.account_archive.clear().await {
            warn!(error = %e, "failed to clear account archive");
        }
        if let Err(e) = self.address_archive.clear().await {
            warn!(error = %e, "failed to clear address archive");
        }

        state.account = Account::NotSynchronized;
        state.address = Address::NotSet;
        self.account.publish_if_changed(Account::NotSynchronized);
        self.address.publish_if_changed(Address::NotSet);
        self.publish_session(state);
    }

    fn publish_session(&self, state: &SessionState) {
        self.session
            .publish_if_changed(Session::compose(&state.account, &state.address));
    }
}

impl std::fmt::Debug for SessionStateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStateStore")
            .field("account", &self.account())
            .field("address", &self.address())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::AccountAddress;
    use async_trait::async_trait;
    use chrono::Utc;
    use homebase_store::{MemoryArchive, StoreError, StoreResult};

    struct BrokenArchive;

    #[async_trait]
    impl<T: Send + Sync + 'static> Archive<T> for BrokenArchive {
        async fn save(&self, _item: &T) -> StoreResult<()> {
            Err(StoreError::ArchiveUnavailable {
                location: "broken".into(),
                reason: "test".into(),
            })
        }
        async fn load(&self) -> StoreResult<Option<T>> {
            Err(StoreError::ArchiveUnavailable {
                location: "broken".into(),
                reason: "test".into(),
            })
        }
        async fn clear(&self) -> StoreResult<()> {
            Ok(())
        }
    }

    fn account(addresses: &[&str]) -> CurrentAccount {
        let now = Utc::now();
        CurrentAccount::new(
            "Alice",
            "alice@example.com",
            now,
            addresses.iter().map(|a| AccountAddress::new(*a, now)).collect(),
        )
    }

    struct Fixture {
        accounts: Arc<MemoryArchive<CurrentAccount>>,
        addresses: Arc<MemoryArchive<String>>,
        store: SessionStateStore,
    }

    async fn fixture() -> Fixture {
        let accounts = Arc::new(MemoryArchive::new());
        let addresses = Arc::new(MemoryArchive::new());
        let store = SessionStateStore::load(accounts.clone(), addresses.clone()).await;
        Fixture {
            accounts,
            addresses,
            store,
        }
    }

    #[tokio::test]
    async fn first_account_selects_first_address() {
        let f = fixture().await;
        f.store.set_current_account(account(&["a", "b"])).await;

        assert_eq!(f.store.address(), Address::Selected("a".into()));
        assert_eq!(f.addresses.snapshot().as_deref(), Some("a"));
        assert!(f.accounts.snapshot().is_some());
        assert!(f.store.session().is_available());
    }

    #[tokio::test]
    async fn account_without_addresses_leaves_address_unset() {
        let f = fixture().await;
        f.store.set_current_account(account(&[])).await;

        assert!(f.store.account().as_present().is_some());
        assert_eq!(f.store.address(), Address::NotSet);
        assert_eq!(f.store.session(), Session::NotAvailable);
    }

    #[tokio::test]
    async fn existing_selection_is_not_repaired() {
        let f = fixture().await;
        f.store.set_current_account(account(&["a", "b"])).await;
        f.store.set_selected_address("b").await;

        f.store.set_current_account(account(&["c"])).await;

        assert_eq!(f.store.address(), Address::Selected("b".into()));
    }

    #[tokio::test]
    async fn session_subscribers_see_account_then_derived_address() {
        let f = fixture().await;
        let mut sessions = f.store.observe_session();
        let mut accounts = f.store.observe_account();
        let mut addresses = f.store.observe_address();

        assert_eq!(sessions.recv().await, Some(Session::NotAvailable));
        assert_eq!(accounts.recv().await, Some(Account::NotSynchronized));
        assert_eq!(addresses.recv().await, Some(Address::NotSet));

        let current = account(&["a"]);
        f.store.set_current_account(current.clone()).await;

        assert_eq!(accounts.recv().await, Some(Account::Present(current.clone())));
        assert_eq!(addresses.recv().await, Some(Address::Selected("a".into())));
        assert_eq!(
            sessions.recv().await,
            Some(Session::Available {
                account: current,
                address: "a".into()
            })
        );
        assert_eq!(sessions.try_recv(), None);
    }

    #[tokio::test]
    async fn account_write_failure_resets_everything() {
        let f = fixture().await;
        f.store.set_current_account(account(&["a"])).await;

        f.accounts.set_fail_writes(true);
        let mut sessions = f.store.observe_session();
        assert!(sessions.recv().await.unwrap().is_available());

        f.store.set_current_account(account(&["b"])).await;

        assert_eq!(f.store.account(), Account::NotSynchronized);
        assert_eq!(f.store.address(), Address::NotSet);
        assert_eq!(sessions.recv().await, Some(Session::NotAvailable));
        assert!(f.accounts.snapshot().is_none());
        assert!(f.addresses.snapshot().is_none());
    }

    #[tokio::test]
    async fn address_write_failure_clears_address_only() {
        let f = fixture().await;
        f.store.set_current_account(account(&["a", "b"])).await;

        f.addresses.set_fail_writes(true);
        f.store.set_selected_address("b").await;

        assert_eq!(f.store.address(), Address::NotSet);
        assert!(f.store.account().as_present().is_some());
        assert_eq!(f.store.session(), Session::NotAvailable);
    }

    #[tokio::test]
    async fn clear_session_is_idempotent() {
        let f = fixture().await;
        f.store.set_current_account(account(&["a"])).await;
        let mut accounts = f.store.observe_account();
        accounts.recv().await;

        f.store.clear_session().await;
        f.store.clear_session().await;

        assert_eq!(accounts.recv().await, Some(Account::NotSynchronized));
        assert_eq!(accounts.try_recv(), None);
        assert_eq!(f.store.session(), Session::NotAvailable);
        assert!(f.accounts.snapshot().is_none());
    }

    #[tokio::test]
    async fn load_restores_both_pieces() {
        let current = account(&["a", "b"]);
        let accounts = Arc::new(MemoryArchive::with_value(current.clone()));
        let addresses = Arc::new(MemoryArchive::with_value("b".to_string()));

        let store = SessionStateStore::load(accounts, addresses).await;

        assert_eq!(store.account(), Account::Present(current.clone()));
        assert_eq!(
            store.session(),
            Session::Available {
                account: current,
                address: "b".into()
            }
        );
    }

    #[tokio::test]
    async fn load_failures_are_independent() {
        let addresses = Arc::new(MemoryArchive::with_value("a".to_string()));
        let store = SessionStateStore::load(Arc::new(BrokenArchive), addresses).await;

        assert_eq!(store.account(), Account::NotSynchronized);
        assert_eq!(store.address(), Address::Selected("a".into()));
    }
}
