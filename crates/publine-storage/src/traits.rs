//! Topic store trait definition
//!
//! Defines the interface the broker uses to reach topics and subscriptions.

use async_trait::async_trait;
use publine_types::{ClientId, Item, Result, TopicInfo, TopicStats};

/// Topic store trait - all backends implement this
///
/// The set of topics is fixed when the store is built; every operation on
/// an unknown name fails with `TopicNotFound`.
#[async_trait]
pub trait TopicStore: Send + Sync {
    // ==================== Topic Operations ====================

    /// Get a topic by name
    async fn get_topic(&self, name: &str) -> Result<Option<TopicInfo>>;

    /// List all topics
    async fn list_topics(&self) -> Result<Vec<TopicInfo>>;

    /// Get topic statistics
    async fn topic_stats(&self, name: &str) -> Result<TopicStats>;

    // ==================== Subscription Operations ====================

    /// Subscribe; returns false if the subscription already existed
    async fn add_subscription(&self, topic: &str, subscriber: ClientId) -> Result<bool>;

    /// Unsubscribe; returns false if there was nothing to remove
    async fn remove_subscription(&self, topic: &str, subscriber: ClientId) -> Result<bool>;

    /// Number of items waiting in a subscription
    async fn queue_len(&self, topic: &str, subscriber: ClientId) -> Result<usize>;

    // ==================== Item Operations ====================

    /// Fan an item out to every subscription of a topic
    async fn publish(&self, topic: &str, item: Item) -> Result<usize>;

    /// Take the oldest item from a subscriber's queue
    async fn pop_item(&self, topic: &str, subscriber: ClientId) -> Result<Item>;
}
