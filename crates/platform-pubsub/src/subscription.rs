//! Subscription handle
//!
//! A [`Subscription`] is what a caller holds after [`Bus::subscribe`]. It owns
//! the delivery channel and remembers every topic it joined so that
//! [`Subscription::unsubscribe`] can leave all of them before closing the
//! channel.
//!
//! [`Bus::subscribe`]: crate::Bus::subscribe

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::bus::BusCounters;
use crate::channel::{self, Receiver, Sender};
use crate::topic::Topic;

/// Unique identity of a subscription.
///
/// Time-ordered (UUID v7), so ids sort by creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    /// Generate a fresh id.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Lifecycle of a subscription. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionState {
    /// Receiving events
    Open,
    /// Leaving its topics; the channel is not closed yet
    Unsubscribing,
    /// Channel closed and detached from every topic
    Closed,
}

impl SubscriptionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => SubscriptionState::Open,
            1 => SubscriptionState::Unsubscribing,
            _ => SubscriptionState::Closed,
        }
    }
}

/// A set of topic memberships plus the channel events arrive on.
///
/// Dropping a subscription unsubscribes it.
///
/// # Example
///
/// ```rust
/// use platform_pubsub::Bus;
///
/// let bus = Bus::<String>::new();
/// let sub = bus.subscribe(["rust", "tokio"]);
///
/// bus.publish("hello".to_string(), ["rust", "tokio"]);
/// assert_eq!(sub.channel().recv().unwrap(), "hello");
///
/// sub.unsubscribe();
/// assert!(sub.channel().recv().is_err());
/// ```
pub struct Subscription<E> {
    id: SubscriptionId,
    sender: Sender<E>,
    receiver: Receiver<E>,
    /// Joined topics in join order. Also serializes `unsubscribe`.
    topics: Mutex<Vec<Arc<Topic<E>>>>,
    state: AtomicU8,
    counters: Arc<BusCounters>,
}

impl<E> Subscription<E> {
    pub(crate) fn new(capacity: usize, counters: Arc<BusCounters>) -> Self {
        let (sender, receiver) = channel::bounded(capacity);
        counters.subscription_opened();

        Self {
            id: SubscriptionId::new(),
            sender,
            receiver,
            topics: Mutex::new(Vec::new()),
            state: AtomicU8::new(SubscriptionState::Open as u8),
            counters,
        }
    }

    pub(crate) fn sender(&self) -> &Sender<E> {
        &self.sender
    }

    pub(crate) fn attach(&self, topic: Arc<Topic<E>>) {
        self.topics.lock().push(topic);
    }

    /// Get the subscription id.
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Channel events are delivered on, in publish order.
    ///
    /// Once the subscription is closed and the buffer is drained, reads
    /// return end-of-stream instead of blocking.
    pub fn channel(&self) -> &Receiver<E> {
        &self.receiver
    }

    /// A cloned handle on the delivery channel, for moving into another
    /// thread or task.
    pub fn receiver(&self) -> Receiver<E> {
        self.receiver.clone()
    }

    /// Keys of the joined topics, in join order. Empty once unsubscribed.
    pub fn topics(&self) -> Vec<String> {
        self.topics
            .lock()
            .iter()
            .map(|topic| topic.key().to_owned())
            .collect()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SubscriptionState {
        SubscriptionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Check if the subscription has been closed.
    pub fn is_closed(&self) -> bool {
        self.state() == SubscriptionState::Closed
    }

    /// Leave every joined topic, then close the channel.
    ///
    /// Safe to call more than once and from several threads; calls are
    /// serialized and only the first does anything. A publisher blocked on
    /// this subscription's full channel is released and its event discarded.
    /// Events buffered before the call remain readable.
    pub fn unsubscribe(&self) {
        let mut topics = self.topics.lock();
        if self.state() != SubscriptionState::Open {
            return;
        }

        self.set_state(SubscriptionState::Unsubscribing);
        self.sender.detach();

        // Nothing can send to the channel once it is out of every topic,
        // so closing afterwards never races a publisher.
        for topic in topics.drain(..) {
            topic.remove(self.id);
        }
        self.sender.close();

        self.set_state(SubscriptionState::Closed);
        self.counters.subscription_closed();

        tracing::debug!(subscription_id = %self.id, "subscription closed");
    }

    fn set_state(&self, state: SubscriptionState) {
        self.state.store(state as u8, Ordering::Release);
    }
}

impl<E> Drop for Subscription<E> {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl<E> fmt::Debug for Subscription<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("capacity", &self.receiver.capacity())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RecvError;
    use crate::registry::TopicRegistry;

    fn joined(
        registry: &Arc<TopicRegistry<u32>>,
        counters: &Arc<BusCounters>,
        keys: &[&str],
    ) -> Subscription<u32> {
        let subscription = Subscription::new(4, counters.clone());
        for key in keys {
            let topic = registry.find_or_create(key);
            assert!(topic.add(subscription.id(), subscription.sender().clone()));
            subscription.attach(topic);
        }
        subscription
    }

    #[test]
    fn test_ids_are_unique_and_ordered() {
        let first = SubscriptionId::new();
        let second = SubscriptionId::new();
        assert_ne!(first, second);
        assert!(first < second);
        assert_eq!(first.to_string(), first.as_uuid().to_string());
    }

    #[test]
    fn test_unsubscribe_leaves_topics_then_closes() {
        let registry = Arc::new(TopicRegistry::new());
        let counters = Arc::new(BusCounters::default());
        let sub = joined(&registry, &counters, &["a", "b"]);

        assert_eq!(sub.topics(), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(sub.state(), SubscriptionState::Open);
        assert_eq!(counters.snapshot().active_subscriptions, 1);

        sub.sender().send(1);
        sub.unsubscribe();

        assert_eq!(sub.state(), SubscriptionState::Closed);
        assert!(sub.topics().is_empty());
        assert_eq!(registry.len(), 0);
        assert_eq!(counters.snapshot().active_subscriptions, 0);

        assert_eq!(sub.channel().recv(), Ok(1));
        assert_eq!(sub.channel().recv(), Err(RecvError::Closed));
    }

    #[test]
    fn test_unsubscribe_twice_is_noop() {
        let registry = Arc::new(TopicRegistry::new());
        let counters = Arc::new(BusCounters::default());
        let sub = joined(&registry, &counters, &["a"]);

        sub.unsubscribe();
        sub.unsubscribe();

        assert!(sub.is_closed());
        assert_eq!(counters.snapshot().active_subscriptions, 0);
    }

    #[test]
    fn test_duplicate_join_unsubscribes_cleanly() {
        let registry = Arc::new(TopicRegistry::new());
        let counters = Arc::new(BusCounters::default());
        let sub = joined(&registry, &counters, &["a", "a"]);

        assert_eq!(sub.topics().len(), 2);
        sub.unsubscribe();
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn test_drop_unsubscribes() {
        let registry = Arc::new(TopicRegistry::new());
        let counters = Arc::new(BusCounters::default());
        let sub = joined(&registry, &counters, &["a"]);
        let receiver = sub.receiver();

        drop(sub);

        assert!(receiver.is_closed());
        assert_eq!(registry.len(), 0);
        assert_eq!(counters.snapshot().active_subscriptions, 0);
    }
}
