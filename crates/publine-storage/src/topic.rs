//! Topic fan-out
//!
//! A `Topic` owns the subscriptions registered against it. The subscription
//! map is guarded by one lock per topic; fan-out holds that lock for the
//! whole enumeration so concurrent subscribe/unsubscribe calls land either
//! before or after a publish, never in the middle of one.
//!
//! Lock order is topic map, then subscription queue.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use publine_types::{ClientId, Error, Item, Result, TopicInfo, TopicStats};
use tracing::debug;

use crate::subscription::Subscription;

/// A named topic and the subscriptions registered against it
#[derive(Debug)]
pub struct Topic {
    info: TopicInfo,
    subscriptions: Mutex<HashMap<ClientId, Arc<Subscription>>>,
}

impl Topic {
    /// Create a topic with no subscriptions
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            info: TopicInfo::new(name),
            subscriptions: Mutex::new(HashMap::new()),
        }
    }

    /// Topic metadata
    pub fn info(&self) -> &TopicInfo {
        &self.info
    }

    /// Topic name
    pub fn name(&self) -> &str {
        &self.info.name
    }

    /// Add an empty subscription for `subscriber`. An existing subscription
    /// is left untouched. Returns whether a new one was created.
    pub fn add_subscription(&self, subscriber: ClientId) -> bool {
        let mut subscriptions = self.subscriptions.lock();
        if subscriptions.contains_key(&subscriber) {
            return false;
        }
        subscriptions.insert(
            subscriber,
            Arc::new(Subscription::new(subscriber, self.name())),
        );
        true
    }

    /// Returns whether a subscription was removed
    pub fn remove_subscription(&self, subscriber: ClientId) -> bool {
        self.subscriptions.lock().remove(&subscriber).is_some()
    }

    /// Look up the subscription held by `subscriber`
    pub fn subscription(&self, subscriber: ClientId) -> Result<Arc<Subscription>> {
        self.subscriptions
            .lock()
            .get(&subscriber)
            .cloned()
            .ok_or_else(|| Error::NotSubscribed(self.name().to_string()))
    }

    /// Append a copy of `item` to every current subscription.
    ///
    /// Returns the number of subscriptions reached, or `NoSubscribers`
    /// without enqueuing anything.
    pub fn publish(&self, item: &Item) -> Result<usize> {
        let subscriptions = self.subscriptions.lock();
        if subscriptions.is_empty() {
            return Err(Error::NoSubscribers(self.name().to_string()));
        }

        for subscription in subscriptions.values() {
            subscription.push(item.clone());
        }

        debug!(
            topic = %self.name(),
            item_id = %item.id(),
            fanout = subscriptions.len(),
            "Item published"
        );

        Ok(subscriptions.len())
    }

    /// Number of live subscriptions
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.lock().len()
    }

    /// Subscription and queue depth snapshot
    pub fn stats(&self) -> TopicStats {
        let subscriptions = self.subscriptions.lock();
        TopicStats {
            subscription_count: subscriptions.len() as u64,
            queued_items: subscriptions.values().map(|s| s.len() as u64).sum(),
        }
    }
}
