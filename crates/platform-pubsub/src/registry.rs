//! Concurrent topic registry
//!
//! Maps topic keys to live [`Topic`]s. Topics are created on first subscribe and
//! evict themselves when their last subscription leaves, so the registry only
//! ever holds topics somebody is listening on.

use std::sync::Arc;

use dashmap::DashMap;

use crate::topic::Topic;

pub(crate) struct TopicRegistry<E> {
    topics: DashMap<String, Arc<Topic<E>>>,
}

impl<E> TopicRegistry<E> {
    pub(crate) fn new() -> Self {
        Self {
            topics: DashMap::new(),
        }
    }

    /// Look up the live topic for `key`, creating it if absent.
    ///
    /// Concurrent callers racing to create the same key all receive the one
    /// topic that won the insert. A topic found closed has already been
    /// evicted (closing and eviction share a critical section), so the lookup
    /// is repeated and lands on a fresh topic.
    pub(crate) fn find_or_create(self: &Arc<Self>, key: &str) -> Arc<Topic<E>> {
        let mut attempts: u32 = 0;

        loop {
            let existing = self.topics.get(key).map(|entry| entry.value().clone());
            let topic = match existing {
                Some(topic) => topic,
                None => self
                    .topics
                    .entry(key.to_owned())
                    .or_insert_with(|| {
                        tracing::trace!(topic = %key, "topic created");
                        Arc::new(Topic::new(key, Arc::downgrade(self)))
                    })
                    .value()
                    .clone(),
            };

            // The shard guard is gone by now; taking the topic lock under it
            // would invert the topic -> registry lock order used by eviction.
            if !topic.is_closed() {
                return topic;
            }

            attempts += 1;
            tracing::trace!(topic = %key, attempts, "found closed topic, retrying lookup");
        }
    }

    /// Look up the live topic for `key` without creating it.
    pub(crate) fn get(&self, key: &str) -> Option<Arc<Topic<E>>> {
        self.topics.get(key).map(|entry| entry.value().clone())
    }

    /// Remove `key` only if it still maps to `topic`.
    ///
    /// A newer topic registered under the same key is left alone.
    pub(crate) fn evict(&self, key: &str, topic: &Topic<E>) -> bool {
        let removed = self
            .topics
            .remove_if(key, |_, current| std::ptr::eq(Arc::as_ptr(current), topic))
            .is_some();

        if removed {
            tracing::trace!(topic = %key, "topic evicted");
        }
        removed
    }

    pub(crate) fn len(&self) -> usize {
        self.topics.len()
    }

    pub(crate) fn contains(&self, key: &str) -> bool {
        self.topics.contains_key(key)
    }

    pub(crate) fn keys(&self) -> Vec<String> {
        self.topics.iter().map(|entry| entry.key().clone()).collect()
    }
}
