//! Network side of a feature.
//!
//! [`FeatureApi`] is the raw request surface.  [`RemoteSource`] wraps one
//! and turns every successful list read into a [`ResponseBatch`] published
//! on a broadcast channel.  Repositories never see fetch results directly:
//! they react to what the channel delivers.

use std::sync::Arc;

use async_trait::async_trait;
use homebase_kernel::{BroadcastChannel, Subscription};
use tracing::{debug, instrument};

use crate::error::Result;
use crate::feature::Feature;

/// Response item type of an api's feature.
pub type ResponseOf<A> = <<A as FeatureApi>::Feature as Feature>::Response;
/// Draft type of an api's feature.
pub type DraftOf<A> = <<A as FeatureApi>::Feature as Feature>::Draft;
/// Cached entity type of an api's feature.
pub type EntityOf<A> = <<A as FeatureApi>::Feature as Feature>::Entity;

/// Requests for one feature against the remote API.
#[async_trait]
pub trait FeatureApi: Send + Sync + 'static {
    type Feature: Feature;

    /// Every item of `address`.
    async fn fetch(&self, token: &str, address: &str) -> Result<Vec<ResponseOf<Self>>>;

    async fn create(&self, token: &str, address: &str, draft: &DraftOf<Self>) -> Result<()>;

    async fn update(
        &self,
        token: &str,
        address: &str,
        id: &str,
        draft: &DraftOf<Self>,
    ) -> Result<()>;

    async fn delete(&self, token: &str, address: &str, id: &str) -> Result<()>;
}

/// The complete list of one address's items, as last reported by the server.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseBatch<R> {
    pub address: String,
    pub items: Vec<R>,
}

/// A [`FeatureApi`] plus the channel its list reads are published on.
///
/// The channel replays the latest batch to new subscribers.  It holds
/// `None` before the first read and again after [`clear`](Self::clear), so a
/// repository created after a logout never sees the previous session's
/// items.
pub struct RemoteSource<A: FeatureApi> {
    api: Arc<A>,
    responses: BroadcastChannel<Option<ResponseBatch<ResponseOf<A>>>>,
}

impl<A: FeatureApi> RemoteSource<A> {
    pub fn new(api: A) -> Self {
        Self::from_arc(Arc::new(api))
    }

    pub fn from_arc(api: Arc<A>) -> Self {
        Self {
            api,
            responses: BroadcastChannel::new(None),
        }
    }

    pub fn api(&self) -> &Arc<A> {
        &self.api
    }

    /// Subscribe to list results.
    pub fn responses(&self) -> Subscription<Option<ResponseBatch<ResponseOf<A>>>> {
        self.responses.subscribe()
    }

    /// The batch a new subscriber would be replayed, if any.
    pub fn latest(&self) -> Option<ResponseBatch<ResponseOf<A>>> {
        self.responses.current().flatten()
    }

    /// Forget the last published batch.
    pub fn clear(&self) {
        self.responses.publish(None);
        debug!(feature = A::Feature::name(), "response replay cleared");
    }

    /// Number of live response subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.responses.subscriber_count()
    }

    /// Read `address`'s items and publish them.  Errors are returned and
    /// nothing is published.
    #[instrument(skip(self, token), fields(feature = A::Feature::name()))]
    pub async fn fetch(&self, token: &str, address: &str) -> Result<()> {
        let items = self.api.fetch(token, address).await?;
        debug!(items = items.len(), "list read complete");
        self.responses.publish(Some(ResponseBatch {
            address: address.to_string(),
            items,
        }));
        Ok(())
    }

    pub async fn create(&self, token: &str, address: &str, draft: &DraftOf<A>) -> Result<()> {
        self.api.create(token, address, draft).await
    }

    pub async fn update(
        &self,
        token: &str,
        address: &str,
        id: &str,
        draft: &DraftOf<A>,
    ) -> Result<()> {
        self.api.update(token, address, id, draft).await
    }

    pub async fn delete(&self, token: &str, address: &str, id: &str) -> Result<()> {
        self.api.delete(token, address, id).await
    }
}
