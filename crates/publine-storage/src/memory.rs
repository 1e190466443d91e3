//! In-memory topic store
//!
//! Non-persistent storage; all queues are lost when the process exits.
//! The topic map is built once and never mutated afterwards, so lookups
//! need no lock of their own.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use publine_types::{ClientId, Error, Item, Result, TopicInfo, TopicStats};
use tracing::{debug, info};

use crate::topic::Topic;
use crate::traits::TopicStore;

/// In-memory topic registry
#[derive(Debug)]
pub struct MemoryStore {
    /// Topics stored by name
    topics: HashMap<String, Arc<Topic>>,
}

impl MemoryStore {
    /// Create a store holding exactly the given topics
    pub fn new<I, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut topics = HashMap::new();
        for name in names {
            let name = name.into();
            if topics.contains_key(&name) {
                return Err(Error::TopicAlreadyExists(name));
            }
            info!(topic = %name, "Topic configured");
            topics.insert(name.clone(), Arc::new(Topic::new(name)));
        }

        info!(count = topics.len(), "Initializing in-memory topic store");
        Ok(Self { topics })
    }

    /// Find a topic by name
    pub fn lookup(&self, name: &str) -> Result<&Arc<Topic>> {
        self.topics
            .get(name)
            .ok_or_else(|| Error::TopicNotFound(name.to_string()))
    }
}

#[async_trait]
impl TopicStore for MemoryStore {
    // ==================== Topic Operations ====================

    async fn get_topic(&self, name: &str) -> Result<Option<TopicInfo>> {
        Ok(self.topics.get(name).map(|t| t.info().clone()))
    }

    async fn list_topics(&self) -> Result<Vec<TopicInfo>> {
        let mut topics: Vec<TopicInfo> = self.topics.values().map(|t| t.info().clone()).collect();
        topics.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(topics)
    }

    async fn topic_stats(&self, name: &str) -> Result<TopicStats> {
        Ok(self.lookup(name)?.stats())
    }

    // ==================== Subscription Operations ====================

    async fn add_subscription(&self, topic: &str, subscriber: ClientId) -> Result<bool> {
        let created = self.lookup(topic)?.add_subscription(subscriber);
        debug!(topic = %topic, client_id = %subscriber, created, "Subscription added");
        Ok(created)
    }

    async fn remove_subscription(&self, topic: &str, subscriber: ClientId) -> Result<bool> {
        let removed = self.lookup(topic)?.remove_subscription(subscriber);
        if removed {
            debug!(topic = %topic, client_id = %subscriber, "Subscription removed");
        }
        Ok(removed)
    }

    async fn queue_len(&self, topic: &str, subscriber: ClientId) -> Result<usize> {
        Ok(self.lookup(topic)?.subscription(subscriber)?.len())
    }

    // ==================== Item Operations ====================

    async fn publish(&self, topic: &str, item: Item) -> Result<usize> {
        self.lookup(topic)?.publish(&item)
    }

    async fn pop_item(&self, topic: &str, subscriber: ClientId) -> Result<Item> {
        let item = self.lookup(topic)?.subscription(subscriber)?.pop()?;

        debug!(
            topic = %topic,
            client_id = %subscriber,
            item_id = %item.id(),
            "Item popped"
        );

        Ok(item)
    }
}
