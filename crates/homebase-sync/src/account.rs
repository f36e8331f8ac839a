//! Account synchronization.
//!
//! [`AccountRepository`] fetches the signed-in account (with its addresses)
//! and hands it to the [`SessionStateStore`], which selects the first
//! address on first login.  Its background loop clears the session when a
//! logout event arrives.

use std::sync::Arc;

use async_trait::async_trait;
use homebase_auth::{AuthStateStore, CurrentAccount, SessionStateStore};
use homebase_kernel::Subscription;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::Result;

/// Remote read of the signed-in account.
#[async_trait]
pub trait AccountApi: Send + Sync + 'static {
    async fn fetch_account(&self, token: &str) -> Result<CurrentAccount>;
}

/// Keeps [`SessionStateStore`] in step with the server and with logouts.
///
/// Call [`shutdown`](Self::shutdown) to stop it.  Dropping it aborts the
/// listener, but a session write already in progress on a blocking thread
/// still completes.
pub struct AccountRepository {
    api: Arc<dyn AccountApi>,
    auth: Arc<AuthStateStore>,
    session: Arc<SessionStateStore>,
    stop: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl AccountRepository {
    /// Create the repository and start its logout listener.
    ///
    /// Must be called within a Tokio runtime.
    pub fn new(
        api: Arc<dyn AccountApi>,
        auth: Arc<AuthStateStore>,
        session: Arc<SessionStateStore>,
    ) -> Self {
        let (stop_tx, stop_rx) = oneshot::channel();
        let logouts = auth.observe_logout_events();
        let task = tokio::spawn(listen(Arc::clone(&session), logouts, stop_rx));

        Self {
            api,
            auth,
            session,
            stop: Some(stop_tx),
            task: Some(task),
        }
    }

    /// Fetch the account and store it.  A no-op when logged out.
    pub async fn fetch(&self) -> Result<()> {
        let Some(token) = self.auth.access_token() else {
            debug!("account fetch skipped: not logged in");
            return Ok(());
        };

        let account = self.api.fetch_account(&token).await?;

        // A logout may have raced the request.
        if !self.auth.is_logged_in() {
            debug!("account fetch discarded: logged out meanwhile");
            return Ok(());
        }
        self.session.set_current_account(account).await;
        Ok(())
    }

    /// Stop the logout listener and wait for it to finish.  A logout that
    /// was already signalled is handled first.
    pub async fn shutdown(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for AccountRepository {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            if !task.is_finished() {
                warn!("account repository dropped without shutdown; an in-flight session write may still land");
            }
            task.abort();
        }
    }
}

async fn listen(
    session: Arc<SessionStateStore>,
    mut logouts: Subscription<()>,
    mut stop: oneshot::Receiver<()>,
) {
    loop {
        tokio::select! {
            biased;

            event = logouts.recv() => match event {
                Some(()) => {
                    info!("logout received, clearing session");
                    session.clear_session().await;
                }
                None => break,
            },

            _ = &mut stop => break,
        }
    }
}
