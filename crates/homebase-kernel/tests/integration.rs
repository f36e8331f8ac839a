//! Integration tests for the homebase-kernel crate.
//!
//! These tests drive [`BroadcastChannel`] from several tokio tasks at once,
//! the way the state stores and network sources use it.

use std::time::Duration;

use futures::StreamExt;
use homebase_kernel::BroadcastChannel;

// ═══════════════════════════════════════════════════════════════════════
//  Cross-task delivery
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn subscriber_task_sees_replay_then_updates() {
    let channel = BroadcastChannel::new("a".to_string());
    let sub = channel.subscribe();

    let consumer = tokio::spawn(async move { sub.take(3).collect::<Vec<_>>().await });

    channel.publish("b".to_string());
    channel.publish("c".to_string());

    let seen = tokio::time::timeout(Duration::from_secs(1), consumer)
        .await
        .expect("consumer should finish")
        .expect("consumer should not panic");
    assert_eq!(seen, vec!["a", "b", "c"]);
}

#[tokio::test]
async fn abandoned_iteration_deregisters_subscriber() {
    let channel = BroadcastChannel::new(0u32);

    let task_channel = channel.clone();
    let consumer = tokio::spawn(async move {
        let mut sub = task_channel.subscribe();
        // Stop iterating after the first value; the subscription is dropped
        // when the task returns.
        sub.next().await
    });

    assert_eq!(consumer.await.unwrap(), Some(0));
    assert_eq!(channel.subscriber_count(), 0);
    assert_eq!(channel.publish(1), 0);
}

#[tokio::test]
async fn aborted_consumer_task_deregisters_subscriber() {
    let channel = BroadcastChannel::new(0u32);
    let mut sub = channel.subscribe();
    assert_eq!(sub.recv().await, Some(0));

    let consumer = tokio::spawn(async move {
        while let Some(_value) = sub.recv().await {}
    });
    tokio::task::yield_now().await;
    assert_eq!(channel.subscriber_count(), 1);

    consumer.abort();
    let _ = consumer.await;
    assert_eq!(channel.subscriber_count(), 0);
}

#[tokio::test]
async fn dynamic_subscriber_set() {
    let channel = BroadcastChannel::new(0u32);
    let mut subs: Vec<_> = (0..10).map(|_| channel.subscribe()).collect();
    assert_eq!(channel.subscriber_count(), 10);

    // Drop every other subscriber.
    let mut kept = Vec::new();
    for (i, sub) in subs.drain(..).enumerate() {
        if i % 2 == 0 {
            kept.push(sub);
        }
    }
    assert_eq!(channel.subscriber_count(), 5);
    assert_eq!(channel.publish(42), 5);

    for sub in &mut kept {
        assert_eq!(sub.try_recv(), Some(0));
        assert_eq!(sub.try_recv(), Some(42));
    }
}

#[tokio::test]
async fn event_channel_delivers_only_to_current_subscribers() {
    let events: BroadcastChannel<&'static str> = BroadcastChannel::events();
    let mut early = events.subscribe();

    events.publish("logout");

    let mut late = events.subscribe();
    assert_eq!(early.recv().await, Some("logout"));
    assert_eq!(late.try_recv(), None);
}
