//! Generic network-to-cache synchronization.
//!
//! A [`SyncRepository`] owns one background loop that listens to its
//! feature's [`RemoteSource`] and reconciles every delivered batch into the
//! feature's [`LocalCache`].  A batch is only persisted when the user is
//! logged in and the batch belongs to the currently selected address;
//! otherwise it is dropped and the next fetch re-delivers.  The same loop
//! purges the whole cache when a logout event arrives, and clears the
//! source's replayed batch so the next session starts from nothing.
//!
//! The loop processes one event at a time, so batches are applied in the
//! order the source published them.  Events already queued when a shutdown
//! is requested are handled before the loop stops.

use std::sync::Arc;

use homebase_auth::{AuthStateStore, SessionStateStore};
use homebase_kernel::Subscription;
use homebase_store::{
    Cached, Entity, EntityFilter, EntityKey, LocalCache, ReconcileBatch, ReconcileReport,
    Reconciler, SortOrder,
};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{Result, SyncError};
use crate::feature::Feature;
use crate::remote::{DraftOf, EntityOf, FeatureApi, RemoteSource, ResponseBatch, ResponseOf};

/// Cache handle shared between a repository, its loop and readers.
pub type SharedCache<A> = Arc<dyn LocalCache<EntityOf<A>>>;

/// Generic repository for one feature.
///
/// Call [`shutdown`](Self::shutdown) to stop it.  Dropping the repository
/// only aborts the loop at its next suspension point: a cache write already
/// handed to a blocking thread still runs to completion afterwards.  Each
/// reconcile commits as a whole, so that write never leaves a partial batch.
pub struct SyncRepository<A: FeatureApi> {
    remote: Arc<RemoteSource<A>>,
    cache: SharedCache<A>,
    auth: Arc<AuthStateStore>,
    session: Arc<SessionStateStore>,
    stop: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl<A: FeatureApi> SyncRepository<A> {
    /// Create the repository and start its loop.
    ///
    /// Must be called within a Tokio runtime.  The loop's subscriptions are
    /// registered before this returns.
    pub fn new(
        remote: Arc<RemoteSource<A>>,
        cache: SharedCache<A>,
        auth: Arc<AuthStateStore>,
        session: Arc<SessionStateStore>,
    ) -> Self {
        let (stop_tx, stop_rx) = oneshot::channel();
        let worker = Worker::<A> {
            remote: Arc::clone(&remote),
            cache: Arc::clone(&cache),
            auth: Arc::clone(&auth),
            session: Arc::clone(&session),
        };
        let responses = remote.responses();
        let logouts = auth.observe_logout_events();
        let task = tokio::spawn(worker.run(responses, logouts, stop_rx));

        debug!(feature = A::Feature::name(), "sync loop started");
        Self {
            remote,
            cache,
            auth,
            session,
            stop: Some(stop_tx),
            task: Some(task),
        }
    }

    pub fn cache(&self) -> &SharedCache<A> {
        &self.cache
    }

    pub fn remote(&self) -> &Arc<RemoteSource<A>> {
        &self.remote
    }

    /// Ask the server for the selected address's items.
    ///
    /// Returns `Ok(())` without any request when logged out or when no
    /// address is selected.  The result arrives through the response
    /// channel, not the return value.
    pub async fn fetch(&self) -> Result<()> {
        let Some((token, address)) = self.credentials() else {
            debug!(feature = A::Feature::name(), "fetch skipped: not logged in or no address");
            return Ok(());
        };
        self.remote.fetch(&token, &address).await
    }

    /// Create an item, then refetch so server-assigned fields are cached.
    pub async fn create(&self, draft: &DraftOf<A>) -> Result<()> {
        let (token, address) = self.require_credentials()?;
        self.remote.create(&token, &address, draft).await?;
        info!(feature = A::Feature::name(), address = %address, "item created");
        self.remote.fetch(&token, &address).await
    }

    /// Update an item, then refetch.
    pub async fn update(&self, id: &str, draft: &DraftOf<A>) -> Result<()> {
        let (token, address) = self.require_credentials()?;
        self.remote.update(&token, &address, id, draft).await?;
        info!(feature = A::Feature::name(), address = %address, id, "item updated");
        self.remote.fetch(&token, &address).await
    }

    /// Delete an item remotely, then drop it from the cache.
    ///
    /// A local removal failure is logged, not returned: the remote deletion
    /// already happened and the next fetch prunes the item anyway.
    pub async fn delete(&self, id: &str) -> Result<()> {
        let (token, address) = self.require_credentials()?;
        self.remote.delete(&token, &address, id).await?;
        info!(feature = A::Feature::name(), address = %address, id, "item deleted");

        let key = EntityKey::new(address, id);
        if let Err(e) = self.cache.delete_where(EntityFilter::Key(key.clone())).await {
            warn!(feature = A::Feature::name(), key = %key, error = %e, "failed to remove deleted item from cache");
        }
        Ok(())
    }

    /// Cached items of the selected address, empty when none is selected.
    pub async fn items(&self, sort: SortOrder) -> Result<Vec<Cached<EntityOf<A>>>> {
        let Some(address) = self.session.address().selected().map(String::from) else {
            return Ok(Vec::new());
        };
        Ok(self.cache.query(EntityFilter::Address(address), sort).await?)
    }

    /// Stop the loop and wait for it to finish.  Queued batches and logout
    /// events are handled first; no cache write happens after this returns.
    pub async fn shutdown(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(task) = self.task.take()
            && let Err(e) = task.await
            && e.is_panic()
        {
            warn!(feature = A::Feature::name(), "sync loop panicked");
        }
        debug!(feature = A::Feature::name(), "sync loop stopped");
    }

    fn credentials(&self) -> Option<(String, String)> {
        let token = self.auth.access_token()?;
        let address = self.session.address().selected()?.to_string();
        Some((token, address))
    }

    fn require_credentials(&self) -> Result<(String, String)> {
        let token = self.auth.require_access_token()?;
        let address = self
            .session
            .address()
            .selected()
            .map(String::from)
            .ok_or(SyncError::NoAddressSelected)?;
        Ok((token, address))
    }
}

impl<A: FeatureApi> Drop for SyncRepository<A> {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            if !task.is_finished() {
                warn!(
                    feature = A::Feature::name(),
                    "sync repository dropped without shutdown; an in-flight cache write may still land"
                );
            }
            task.abort();
        }
    }
}

// ---------------------------------------------------------------------------
// Background loop
// ---------------------------------------------------------------------------

struct Worker<A: FeatureApi> {
    remote: Arc<RemoteSource<A>>,
    cache: SharedCache<A>,
    auth: Arc<AuthStateStore>,
    session: Arc<SessionStateStore>,
}

impl<A: FeatureApi> Worker<A> {
    async fn run(
        self,
        mut responses: Subscription<Option<ResponseBatch<ResponseOf<A>>>>,
        mut logouts: Subscription<()>,
        mut stop: oneshot::Receiver<()>,
    ) {
        loop {
            tokio::select! {
                biased;

                event = logouts.recv() => match event {
                    Some(()) => {
                        self.remote.clear();
                        self.purge().await;
                    }
                    None => break,
                },

                batch = responses.recv() => match batch {
                    Some(Some(batch)) => {
                        self.apply(batch).await;
                    }
                    Some(None) => {}
                    None => break,
                },

                _ = &mut stop => break,
            }
        }
    }

    /// Gate, map and reconcile one batch.
    async fn apply(&self, batch: ResponseBatch<ResponseOf<A>>) -> Option<ReconcileReport> {
        let feature = A::Feature::name();

        if !self.auth.is_logged_in() {
            debug!(feature, address = %batch.address, "batch dropped: logged out");
            return None;
        }
        match self.session.address().selected() {
            Some(selected) if selected == batch.address => {}
            selected => {
                debug!(
                    feature,
                    address = %batch.address,
                    selected = selected.unwrap_or("(none)"),
                    "batch dropped: not the selected address"
                );
                return None;
            }
        }

        let entities = batch
            .items
            .into_iter()
            .map(A::Feature::to_entity)
            .collect();
        let report = Reconciler::apply(
            self.cache.as_ref(),
            ReconcileBatch::for_address(batch.address, entities),
        )
        .await;

        if !report.is_clean() {
            warn!(feature, failed = report.failed, "batch reconciled with failures");
        }
        Some(report)
    }

    async fn purge(&self) {
        let kind = <EntityOf<A> as Entity>::KIND;
        match self.cache.delete_where(EntityFilter::All).await {
            Ok(n) => info!(feature = kind, purged = n, "cache purged after logout"),
            Err(e) => warn!(feature = kind, error = %e, "failed to purge cache after logout"),
        }
    }
}
