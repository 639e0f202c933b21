//! Event bus implementation
//!
//! This module ties the topic registry and the configured channel capacity
//! together behind [`Bus::publish`] and [`Bus::subscribe`].

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::BusConfig;
use crate::registry::TopicRegistry;
use crate::subscription::Subscription;

/// Event bus trait for publish/subscribe operations.
///
/// Object safe, so transport and ingestion layers can hold an
/// `Arc<dyn EventBus<E>>` instead of a concrete [`Bus`].
pub trait EventBus<E>: Send + Sync {
    /// Publish an event to the given topic keys.
    ///
    /// Returns how many subscriptions received it.
    fn publish(&self, event: E, topics: &[&str]) -> usize;

    /// Subscribe to the given topic keys.
    fn subscribe(&self, topics: &[&str]) -> Subscription<E>;

    /// Get event bus stats.
    fn stats(&self) -> BusStats;
}

/// Event bus statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusStats {
    /// Total publish calls
    pub events_published: u64,
    /// Total events accepted by subscription channels
    pub events_delivered: u64,
    /// Subscriptions not yet unsubscribed
    pub active_subscriptions: usize,
    /// Topics with at least one subscription
    pub topics: usize,
}

#[derive(Debug, Default)]
pub(crate) struct BusCounters {
    events_published: AtomicU64,
    events_delivered: AtomicU64,
    active_subscriptions: AtomicUsize,
}

impl BusCounters {
    pub(crate) fn subscription_opened(&self) {
        self.active_subscriptions.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn subscription_closed(&self) {
        self.active_subscriptions.fetch_sub(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> BusStats {
        BusStats {
            events_published: self.events_published.load(Ordering::Relaxed),
            events_delivered: self.events_delivered.load(Ordering::Relaxed),
            active_subscriptions: self.active_subscriptions.load(Ordering::Relaxed),
            topics: 0,
        }
    }
}

/// In-process publish/subscribe bus.
///
/// Publishers tag events with topic keys; subscribers receive every event
/// published to any key they joined, once per publish and in publish order.
/// Cloning a bus yields another handle on the same topics.
///
/// Publishing blocks while a matching subscriber's channel is full. Slow
/// consumers slow their publishers down instead of losing events. Call
/// [`Bus::publish`] from a blocking context (or `spawn_blocking`) when running
/// inside an async runtime.
///
/// # Example
///
/// ```rust
/// use platform_pubsub::Bus;
///
/// let bus = Bus::<u32>::new();
/// let both = bus.subscribe(["k1", "k2"]);
///
/// // Delivered once even though both keys match
/// assert_eq!(bus.publish(7, ["k1", "k2"]), 1);
/// assert_eq!(both.channel().try_recv(), Ok(7));
/// assert!(both.channel().try_recv().is_err());
///
/// // Nobody listens on k3: a no-op
/// assert_eq!(bus.publish(8, ["k3"]), 0);
/// ```
pub struct Bus<E> {
    registry: Arc<TopicRegistry<E>>,
    counters: Arc<BusCounters>,
    capacity: usize,
}

impl<E> Bus<E> {
    /// Create a bus with the default configuration.
    pub fn new() -> Self {
        Self::with_config(BusConfig::default())
    }

    /// Create a bus from a configuration.
    pub fn with_config(config: BusConfig) -> Self {
        Self {
            registry: Arc::new(TopicRegistry::new()),
            counters: Arc::new(BusCounters::default()),
            capacity: config.capacity(),
        }
    }

    /// Create a bus with a raw buffer size (see [`BusConfig::buffer_size`]).
    pub fn with_buffer_size(buffer_size: i64) -> Self {
        Self::with_config(BusConfig::new(buffer_size))
    }

    /// Capacity of every subscription channel this bus creates.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of topics that currently have subscriptions.
    pub fn topic_count(&self) -> usize {
        self.registry.len()
    }

    /// Check if anyone is subscribed to `key`.
    pub fn has_topic(&self, key: &str) -> bool {
        self.registry.contains(key)
    }

    /// Keys of all topics that currently have subscriptions.
    pub fn topic_keys(&self) -> Vec<String> {
        self.registry.keys()
    }

    /// Number of subscriptions joined to `key`.
    pub fn subscriber_count(&self, key: &str) -> usize {
        self.registry.get(key).map_or(0, |topic| topic.len())
    }

    /// Get bus statistics.
    pub fn stats(&self) -> BusStats {
        BusStats {
            topics: self.registry.len(),
            ..self.counters.snapshot()
        }
    }

    /// Subscribe to topic keys.
    ///
    /// Topics are created on demand. Any key list is accepted: an empty list
    /// yields a subscription that receives nothing, and a repeated key joins
    /// the same topic twice without duplicating deliveries.
    pub fn subscribe<I, K>(&self, topics: I) -> Subscription<E>
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        let subscription = Subscription::new(self.capacity, self.counters.clone());

        for key in topics {
            self.join(&subscription, key.as_ref());
        }

        tracing::debug!(
            subscription_id = %subscription.id(),
            topics = ?subscription.topics(),
            capacity = self.capacity,
            "subscription created"
        );

        subscription
    }

    fn join(&self, subscription: &Subscription<E>, key: &str) {
        loop {
            let topic = self.registry.find_or_create(key);
            if topic.add(subscription.id(), subscription.sender().clone()) {
                subscription.attach(topic);
                return;
            }
            // Its last subscriber left between lookup and join
            tracing::trace!(topic = %key, "topic closed before join, retrying");
        }
    }
}

impl<E: Clone> Bus<E> {
    /// Publish an event to topic keys.
    ///
    /// Keys are visited in the order given. A subscription matching several
    /// keys receives the event once, via the first matching key. Keys without
    /// subscribers are skipped. Returns how many subscriptions received the
    /// event.
    pub fn publish<I, K>(&self, event: E, topics: I) -> usize
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        self.counters.events_published.fetch_add(1, Ordering::Relaxed);

        let mut delivered = HashSet::new();
        let mut accepted = 0;

        for key in topics {
            let key = key.as_ref();
            // `get` hands back an owned topic; no registry guard is held
            // while fanout waits on a full channel.
            let Some(topic) = self.registry.get(key) else {
                continue;
            };
            accepted += topic.fanout(&event, &mut delivered);
        }

        if accepted > 0 {
            self.counters
                .events_delivered
                .fetch_add(accepted as u64, Ordering::Relaxed);
        }

        tracing::trace!(delivered = accepted, "event published");

        accepted
    }
}

impl<E> Default for Bus<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Clone for Bus<E> {
    fn clone(&self) -> Self {
        Self {
            registry: self.registry.clone(),
            counters: self.counters.clone(),
            capacity: self.capacity,
        }
    }
}

impl<E> fmt::Debug for Bus<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bus")
            .field("capacity", &self.capacity)
            .field("topics", &self.registry.len())
            .finish()
    }
}

impl<E: Clone + Send> EventBus<E> for Bus<E> {
    fn publish(&self, event: E, topics: &[&str]) -> usize {
        Bus::publish(self, event, topics.iter().copied())
    }

    fn subscribe(&self, topics: &[&str]) -> Subscription<E> {
        Bus::subscribe(self, topics.iter().copied())
    }

    fn stats(&self) -> BusStats {
        Bus::stats(self)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_BUFFER_SIZE;
    use crate::error::TryRecvError;

    #[test]
    fn test_publish_without_subscribers() {
        let bus = Bus::<u32>::new();
        assert_eq!(bus.publish(1, ["k1", "k2"]), 0);
        assert_eq!(bus.topic_count(), 0);
        assert!(!bus.has_topic("k1"));
    }

    #[test]
    fn test_publish_subscribe() {
        let bus = Bus::new();
        let sub = bus.subscribe(["k1"]);

        assert_eq!(bus.publish("hello", ["k1", "k2"]), 1);
        assert_eq!(sub.channel().try_recv(), Ok("hello"));
        assert_eq!(sub.channel().try_recv(), Err(TryRecvError::Empty));
    }

    #[test]
    fn test_capacity_from_config() {
        assert_eq!(Bus::<u8>::new().capacity(), DEFAULT_BUFFER_SIZE);
        assert_eq!(Bus::<u8>::default().capacity(), DEFAULT_BUFFER_SIZE);
        assert_eq!(Bus::<u8>::with_buffer_size(-3).capacity(), 0);
        assert_eq!(Bus::<u8>::with_buffer_size(42).capacity(), 42);
    }

    #[test]
    fn test_topic_introspection() {
        let bus = Bus::<u8>::new();
        let a = bus.subscribe(["k1", "k2"]);
        let _b = bus.subscribe(["k1"]);

        assert_eq!(bus.topic_count(), 2);
        assert_eq!(bus.subscriber_count("k1"), 2);
        assert_eq!(bus.subscriber_count("k2"), 1);
        assert_eq!(bus.subscriber_count("k3"), 0);

        let mut keys = bus.topic_keys();
        keys.sort();
        assert_eq!(keys, vec!["k1".to_string(), "k2".to_string()]);

        a.unsubscribe();
        assert_eq!(bus.subscriber_count("k1"), 1);
        assert!(!bus.has_topic("k2"));
    }

    #[test]
    fn test_stats() {
        let bus = Bus::<u8>::new();

        let stats = bus.stats();
        assert_eq!(stats, BusStats::default());

        let sub = bus.subscribe(["k1", "k2"]);
        let other = bus.subscribe(["k2"]);
        bus.publish(1, ["k1", "k2"]);
        bus.publish(2, ["k3"]);

        let stats = bus.stats();
        assert_eq!(stats.events_published, 2);
        assert_eq!(stats.events_delivered, 2);
        assert_eq!(stats.active_subscriptions, 2);
        assert_eq!(stats.topics, 2);

        drop(other);
        sub.unsubscribe();

        let stats = bus.stats();
        assert_eq!(stats.active_subscriptions, 0);
        assert_eq!(stats.topics, 0);
    }

    #[test]
    fn test_subscribe_after_topic_closed_joins_fresh_topic() {
        let bus = Bus::<u8>::new();
        let (tx, _rx) = crate::channel::bounded(1);
        let id = crate::subscription::SubscriptionId::new();

        let stale = bus.registry.find_or_create("k1");
        assert!(stale.add(id, tx.clone()));
        stale.remove(id);
        assert!(stale.is_closed());
        assert!(!bus.has_topic("k1"));

        let sub = bus.subscribe(["k1"]);
        let fresh = bus.registry.get("k1").expect("topic recreated");
        assert!(!Arc::ptr_eq(&stale, &fresh));
        assert!(!stale.add(id, tx));
        assert_eq!(stale.len(), 0);
        assert_eq!(fresh.len(), 1);

        assert_eq!(bus.publish(3, ["k1"]), 1);
        assert_eq!(sub.channel().try_recv(), Ok(3));
    }

    #[test]
    fn test_clones_share_topics() {
        let bus = Bus::<u8>::new();
        let handle = bus.clone();
        let sub = bus.subscribe(["k1"]);

        handle.publish(9, ["k1"]);
        assert_eq!(sub.channel().try_recv(), Ok(9));
        assert_eq!(handle.topic_count(), 1);
    }

    #[test]
    fn test_trait_object() {
        let bus: Arc<dyn EventBus<String>> = Arc::new(Bus::new());
        let sub = bus.subscribe(&["k1"]);

        assert_eq!(bus.publish("via trait".to_string(), &["k1"]), 1);
        assert_eq!(sub.channel().try_recv(), Ok("via trait".to_string()));
        assert_eq!(bus.stats().active_subscriptions, 1);
    }
}
