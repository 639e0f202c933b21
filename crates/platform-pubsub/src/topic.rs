//! Topic state: the set of subscriptions listening on one key
//!
//! Mutations (add/remove) take the topic's write lock. Fanout only reads the
//! set, so it runs under the read lock and never blocks fanout on other
//! topics. A topic whose set drains to empty closes and evicts itself from
//! the registry inside the same critical section; a closed topic is never
//! reused.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Weak;

use parking_lot::RwLock;

use crate::channel::Sender;
use crate::registry::TopicRegistry;
use crate::subscription::SubscriptionId;

pub(crate) struct Topic<E> {
    key: String,
    state: RwLock<TopicState<E>>,
    /// Non-owning: used only to request this topic's own eviction
    registry: Weak<TopicRegistry<E>>,
}

struct TopicState<E> {
    subscriptions: HashMap<SubscriptionId, Sender<E>>,
    closed: bool,
}

impl<E> Topic<E> {
    pub(crate) fn new(key: &str, registry: Weak<TopicRegistry<E>>) -> Self {
        Self {
            key: key.to_owned(),
            state: RwLock::new(TopicState {
                subscriptions: HashMap::new(),
                closed: false,
            }),
            registry,
        }
    }

    pub(crate) fn key(&self) -> &str {
        &self.key
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.state.read().closed
    }

    pub(crate) fn len(&self) -> usize {
        self.state.read().subscriptions.len()
    }

    /// Register a subscription's sender.
    ///
    /// Returns `false` if the topic closed after it was looked up; the caller
    /// must look the key up again.
    pub(crate) fn add(&self, id: SubscriptionId, sender: Sender<E>) -> bool {
        let mut state = self.state.write();
        if state.closed {
            return false;
        }
        state.subscriptions.insert(id, sender);
        true
    }

    /// Drop a subscription. Closes and evicts the topic when it was the last one.
    pub(crate) fn remove(&self, id: SubscriptionId) {
        let mut state = self.state.write();
        if state.subscriptions.remove(&id).is_none() {
            return;
        }

        if state.subscriptions.is_empty() {
            state.closed = true;
            if let Some(registry) = self.registry.upgrade() {
                registry.evict(&self.key, self);
            }
        }
    }
}

impl<E: Clone> Topic<E> {
    /// Deliver `event` to every subscription not already in `delivered`.
    ///
    /// Blocks on a full subscription channel. Returns the number of
    /// subscriptions that accepted the event.
    pub(crate) fn fanout(&self, event: &E, delivered: &mut HashSet<SubscriptionId>) -> usize {
        let state = self.state.read();
        let mut accepted = 0;

        for (id, sender) in state.subscriptions.iter() {
            if !delivered.insert(*id) {
                continue;
            }
            if sender.send(event.clone()) {
                accepted += 1;
            }
        }

        accepted
    }
}

impl<E> fmt::Debug for Topic<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read();
        f.debug_struct("Topic")
            .field("key", &self.key)
            .field("subscriptions", &state.subscriptions.len())
            .field("closed", &state.closed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{self, Receiver};
    use crate::error::TryRecvError;
    use std::sync::Arc;

    fn subscriber(capacity: usize) -> (SubscriptionId, Sender<&'static str>, Receiver<&'static str>) {
        let (tx, rx) = channel::bounded(capacity);
        (SubscriptionId::new(), tx, rx)
    }

    #[test]
    fn test_fanout_reaches_every_subscription() {
        let registry = Arc::new(TopicRegistry::new());
        let topic = registry.find_or_create("alerts");
        let (a, a_tx, a_rx) = subscriber(2);
        let (b, b_tx, b_rx) = subscriber(2);
        topic.add(a, a_tx);
        topic.add(b, b_tx);

        let mut delivered = HashSet::new();
        assert_eq!(topic.fanout(&"disk full", &mut delivered), 2);
        assert_eq!(delivered.len(), 2);
        assert_eq!(a_rx.try_recv(), Ok("disk full"));
        assert_eq!(b_rx.try_recv(), Ok("disk full"));
    }

    #[test]
    fn test_fanout_skips_already_delivered() {
        let registry = Arc::new(TopicRegistry::new());
        let topic = registry.find_or_create("alerts");
        let (a, a_tx, a_rx) = subscriber(2);
        topic.add(a, a_tx);

        let mut delivered = HashSet::from([a]);
        assert_eq!(topic.fanout(&"disk full", &mut delivered), 0);
        assert_eq!(a_rx.try_recv(), Err(TryRecvError::Empty));
    }

    #[test]
    fn test_last_remove_closes_and_evicts() {
        let registry = Arc::new(TopicRegistry::new());
        let topic = registry.find_or_create("alerts");
        let (a, a_tx, _a_rx) = subscriber(1);
        let (b, b_tx, _b_rx) = subscriber(1);
        topic.add(a, a_tx);
        topic.add(b, b_tx.clone());

        topic.remove(a);
        assert!(!topic.is_closed());
        assert_eq!(topic.len(), 1);
        assert!(registry.contains("alerts"));

        topic.remove(b);
        assert!(topic.is_closed());
        assert!(!registry.contains("alerts"));

        // Joining a closed topic is refused
        assert!(!topic.add(b, b_tx));
    }

    #[test]
    fn test_remove_unknown_subscription_is_noop() {
        let registry = Arc::new(TopicRegistry::<&'static str>::new());
        let topic = registry.find_or_create("alerts");
        let (a, a_tx, _a_rx) = subscriber(1);
        topic.add(a, a_tx);

        topic.remove(SubscriptionId::new());
        assert!(!topic.is_closed());
        assert_eq!(topic.key(), "alerts");
    }

    #[test]
    fn test_eviction_spares_newer_topic() {
        let registry = Arc::new(TopicRegistry::new());
        let (a, a_tx, _a_rx) = subscriber(1);
        let detached = Topic::new("alerts", Arc::downgrade(&registry));
        detached.add(a, a_tx);

        let live = registry.find_or_create("alerts");
        detached.remove(a);

        assert!(detached.is_closed());
        assert!(Arc::ptr_eq(&registry.get("alerts").unwrap(), &live));
    }
}
