//! Replaying broadcast channel.
//!
//! [`BroadcastChannel`] holds a single current value plus a dynamic registry
//! of subscribers.  Every subscriber receives the current value immediately
//! on [`subscribe`](BroadcastChannel::subscribe) and then every subsequent
//! [`publish`](BroadcastChannel::publish), in order, until its
//! [`Subscription`] is dropped.
//!
//! Unlike [`tokio::sync::broadcast`], no subscriber can lag or miss a value:
//! each one owns an unbounded queue, so a slow consumer never blocks the
//! publisher and never loses updates.  Unlike [`tokio::sync::watch`],
//! intermediate values are not coalesced.
//!
//! Event channels built with [`BroadcastChannel::events`] keep no current
//! value: late subscribers only observe values published after they joined.
//!
//! # Usage
//!
//! ```rust,no_run
//! # use homebase_kernel::BroadcastChannel;
//! # async fn example() {
//! let logged_in = BroadcastChannel::new(false);
//! let mut sub = logged_in.subscribe();
//!
//! assert_eq!(sub.recv().await, Some(false)); // replayed current value
//! logged_in.publish(true);
//! assert_eq!(sub.recv().await, Some(true));
//! # }
//! ```

use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Identifier handed to each subscriber so it can deregister itself.
type SubscriberId = u64;

struct Registry<T> {
    /// Last published value; always `None` on event channels.
    current: Option<T>,
    /// Whether `current` is retained and replayed to new subscribers.
    replay: bool,
    next_id: SubscriberId,
    /// Subscribers in registration order.
    subscribers: Vec<(SubscriberId, mpsc::UnboundedSender<T>)>,
}

fn lock<T>(registry: &Mutex<Registry<T>>) -> MutexGuard<'_, Registry<T>> {
    // The registry holds plain values only, so a panic elsewhere cannot
    // leave it logically inconsistent.
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// BroadcastChannel
// ---------------------------------------------------------------------------

/// A single mutable value fanned out to a dynamic set of subscribers.
///
/// The channel is cheaply cloneable (`Arc`-backed); all clones share the same
/// value and registry.  Publishing and subscribing are serialized through one
/// lock, which is what guarantees that the replayed value a new subscriber
/// sees is never followed by an older one.
pub struct BroadcastChannel<T> {
    inner: Arc<Mutex<Registry<T>>>,
}

impl<T> Clone for BroadcastChannel<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Clone + Send + 'static> BroadcastChannel<T> {
    /// Create a state channel whose current value is `initial`.
    #[must_use]
    pub fn new(initial: T) -> Self {
        Self::with_registry(Some(initial), true)
    }

    /// Create an event channel.
    ///
    /// Event channels carry occurrences, not state: nothing is retained
    /// between publishes and a late subscriber never sees a historical event.
    #[must_use]
    pub fn events() -> Self {
        Self::with_registry(None, false)
    }

    fn with_registry(current: Option<T>, replay: bool) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Registry {
                current,
                replay,
                next_id: 0,
                subscribers: Vec::new(),
            })),
        }
    }

    /// Store `value` and deliver it to every registered subscriber.
    ///
    /// Delivery is a non-blocking enqueue per subscriber, in registration
    /// order.  Subscribers whose handle has already been dropped are pruned.
    /// Returns the number of subscribers the value was delivered to.
    pub fn publish(&self, value: T) -> usize {
        let mut registry = lock(&self.inner);

        registry
            .subscribers
            .retain(|(_, tx)| tx.send(value.clone()).is_ok());

        if registry.replay {
            registry.current = Some(value);
        }

        let delivered = registry.subscribers.len();
        tracing::trace!(subscribers = delivered, "value published");
        delivered
    }

    /// Register a new subscriber.
    ///
    /// On state channels the current value is enqueued before this returns,
    /// so it is always the first item the subscription yields.
    pub fn subscribe(&self) -> Subscription<T> {
        let mut registry = lock(&self.inner);

        let id = registry.next_id;
        registry.next_id += 1;

        let (tx, rx) = mpsc::unbounded_channel();
        if let Some(current) = registry.current.clone() {
            // The receiver is alive in this scope, so the send cannot fail.
            let _ = tx.send(current);
        }
        registry.subscribers.push((id, tx));

        tracing::trace!(
            subscriber = id,
            subscribers = registry.subscribers.len(),
            "subscriber registered"
        );

        Subscription {
            id,
            rx,
            registry: Arc::downgrade(&self.inner),
        }
    }

    /// Snapshot of the current value (`None` on event channels).
    pub fn current(&self) -> Option<T> {
        lock(&self.inner).current.clone()
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        lock(&self.inner).subscribers.len()
    }
}

impl<T: Clone + PartialEq + Send + 'static> BroadcastChannel<T> {
    /// Publish `value` only if it differs from the current value.
    ///
    /// Returns `true` when a publish happened.  The comparison and the publish
    /// happen under the same lock.
    pub fn publish_if_changed(&self, value: T) -> bool {
        let mut registry = lock(&self.inner);
        if registry.current.as_ref() == Some(&value) {
            return false;
        }

        registry
            .subscribers
            .retain(|(_, tx)| tx.send(value.clone()).is_ok());
        if registry.replay {
            registry.current = Some(value);
        }
        true
    }
}

// ---------------------------------------------------------------------------
// Subscription
// ---------------------------------------------------------------------------

/// Receiving half of a [`BroadcastChannel`] registration.
///
/// Yields values in publish order.  Dropping the subscription removes it from
/// the channel's registry; no further values are queued for it afterwards.
/// The stream ends (`None`) once every clone of the channel is dropped.
pub struct Subscription<T> {
    id: SubscriberId,
    rx: mpsc::UnboundedReceiver<T>,
    registry: Weak<Mutex<Registry<T>>>,
}

impl<T> Subscription<T> {
    /// Wait for the next value.
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Take the next already-queued value without waiting.
    pub fn try_recv(&mut self) -> Option<T> {
        self.rx.try_recv().ok()
    }
}

impl<T> Stream for Subscription<T> {
    type Item = T;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        self.get_mut().rx.poll_recv(cx)
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            let mut registry = lock(&registry);
            registry.subscribers.retain(|(id, _)| *id != self.id);
            tracing::trace!(subscriber = self.id, "subscriber deregistered");
        }
    }
}

impl<T> std::fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
