//! Broker - Main orchestrator
//!
//! The Broker owns the topic store and the client registry and is shared
//! by every connection.

use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;
use publine_storage::{MemoryStore, TopicStore};
use publine_types::{
    ClientId, ClientIdGenerator, Frame, Item, ItemId, Result, Role, TopicInfo, TopicStats,
};
use tracing::{debug, info, warn};

use crate::clients::{ClientEntry, ClientRegistry};

/// Main message broker
pub struct Broker {
    /// Topic backend
    store: Arc<dyn TopicStore>,
    /// Registered connections
    clients: ClientRegistry,
    ids: ClientIdGenerator,
}

impl Broker {
    /// Create a new broker with the given topic store
    pub fn new(store: impl TopicStore + 'static) -> Self {
        Self::with_store(Arc::new(store))
    }

    /// Create a new broker with an Arc store
    pub fn with_store(store: Arc<dyn TopicStore>) -> Self {
        info!("Initializing Publine broker");
        Self {
            store,
            clients: ClientRegistry::new(),
            ids: ClientIdGenerator::new(),
        }
    }

    /// Create a broker with an in-memory store holding `topics`
    pub fn with_topics<I, S>(topics: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Ok(Self::new(MemoryStore::new(topics)?))
    }

    /// Get a reference to the topic store
    pub fn store(&self) -> &dyn TopicStore {
        self.store.as_ref()
    }

    /// Get a reference to the client registry
    pub fn clients(&self) -> &ClientRegistry {
        &self.clients
    }

    /// Allocate an id for a new connection
    pub fn next_client_id(&self) -> ClientId {
        self.ids.next_id()
    }

    // ==================== Client Operations ====================

    /// Register a connection under its role
    pub fn register_client(&self, entry: ClientEntry) -> Result<()> {
        let (id, role, peer) = (entry.id, entry.role, entry.peer);
        self.clients.register(entry)?;
        info!(client_id = %id, role = %role, peer = %peer, "Client registered");
        Ok(())
    }

    /// Remove a connection from the registry
    pub fn unregister_client(&self, id: ClientId) -> Option<ClientEntry> {
        self.clients.unregister(id)
    }

    /// Role a connection registered with
    pub fn role_of(&self, id: ClientId) -> Result<Role> {
        self.clients.role_of(id)
    }

    /// Number of registered connections
    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Release everything a connection holds: its registry entry and its
    /// subscription on each of `topics`.
    pub async fn disconnect<'a, I>(&self, id: ClientId, topics: I) -> usize
    where
        I: IntoIterator<Item = &'a str>,
    {
        self.clients.unregister(id);

        let mut removed = 0;
        for topic in topics {
            match self.store.remove_subscription(topic, id).await {
                Ok(true) => removed += 1,
                Ok(false) => {}
                Err(e) => warn!(client_id = %id, topic = %topic, error = %e, "Failed to drop subscription"),
            }
        }

        debug!(client_id = %id, subscriptions = removed, "Client cleaned up");
        removed
    }

    /// Tell every registered connection the broker is going away
    pub fn shutdown_notice(&self, reason: &str) -> usize {
        self.clients.notify_all(&Frame::error(reason))
    }

    // ==================== Topic Operations ====================

    /// Get a topic by name
    pub async fn get_topic(&self, name: &str) -> Result<Option<TopicInfo>> {
        self.store.get_topic(name).await
    }

    /// List all topics
    pub async fn list_topics(&self) -> Result<Vec<TopicInfo>> {
        self.store.list_topics().await
    }

    /// Get topic statistics
    pub async fn topic_stats(&self, name: &str) -> Result<TopicStats> {
        self.store.topic_stats(name).await
    }

    // ==================== Item Operations ====================

    /// Publish a payload to every subscription of a topic
    pub async fn publish(&self, topic: &str, payload: impl Into<Bytes>) -> Result<ItemId> {
        let item = Item::new(payload);
        let id = item.id();
        let fanout = self.store.publish(topic, item).await?;
        debug!(topic = %topic, item_id = %id, fanout, "Publish accepted");
        Ok(id)
    }

    /// Subscribe; returns false when the subscription already existed
    pub async fn subscribe(&self, topic: &str, subscriber: ClientId) -> Result<bool> {
        self.store.add_subscription(topic, subscriber).await
    }

    /// Unsubscribe; returns false when there was nothing to remove
    pub async fn unsubscribe(&self, topic: &str, subscriber: ClientId) -> Result<bool> {
        self.store.remove_subscription(topic, subscriber).await
    }

    /// Take the next item from a subscriber's queue
    pub async fn receive(&self, topic: &str, subscriber: ClientId) -> Result<Item> {
        let item = self.store.pop_item(topic, subscriber).await?;
        let queued_ms = (Utc::now() - item.published_at()).num_milliseconds();
        debug!(topic = %topic, client_id = %subscriber, item_id = %item.id(), queued_ms, "Item delivered");
        Ok(item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use publine_types::Error;
    use tokio::sync::mpsc;

    fn create_test_broker() -> Broker {
        Broker::with_topics(["default"]).unwrap()
    }

    #[tokio::test]
    async fn test_publish_and_receive() {
        let broker = create_test_broker();
        let sub = broker.next_client_id();
        broker.subscribe("default", sub).await.unwrap();

        let id = broker.publish("default", "Hello World!").await.unwrap();

        let before_receive = chrono::Utc::now();
        let item = broker.receive("default", sub).await.unwrap();
        assert_eq!(item.id(), id);
        assert!(item.published_at() <= before_receive);
        assert_eq!(item.payload_as_str(), Some("Hello World!"));

        assert!(matches!(
            broker.receive("default", sub).await,
            Err(Error::QueueEmpty(_))
        ));
    }

    #[tokio::test]
    async fn test_queue_isolation() {
        let broker = create_test_broker();
        let a = broker.next_client_id();
        let b = broker.next_client_id();
        broker.subscribe("default", a).await.unwrap();
        broker.subscribe("default", b).await.unwrap();

        let id = broker.publish("default", "once").await.unwrap();

        assert_eq!(broker.receive("default", a).await.unwrap().id(), id);
        assert_eq!(broker.receive("default", b).await.unwrap().id(), id);
        assert!(broker.receive("default", a).await.is_err());
    }

    #[tokio::test]
    async fn test_publish_order_preserved() {
        let broker = create_test_broker();
        let sub = broker.next_client_id();
        broker.subscribe("default", sub).await.unwrap();

        for i in 0..5 {
            broker
                .publish("default", format!("Message {}", i))
                .await
                .unwrap();
        }

        for i in 0..5 {
            let item = broker.receive("default", sub).await.unwrap();
            assert_eq!(item.to_message(), format!("Message {}", i));
        }
    }

    #[tokio::test]
    async fn test_disconnect_removes_subscriptions() {
        let broker = Broker::with_topics(["default", "metrics"]).unwrap();
        let (tx, _rx) = mpsc::channel(8);
        let sub = broker.next_client_id();
        broker
            .register_client(ClientEntry::new(
                sub,
                Role::Subscriber,
                "127.0.0.1:9".parse().unwrap(),
                tx,
            ))
            .unwrap();
        broker.subscribe("default", sub).await.unwrap();
        broker.subscribe("metrics", sub).await.unwrap();

        let removed = broker.disconnect(sub, ["default", "metrics"]).await;

        assert_eq!(removed, 2);
        assert_eq!(broker.client_count(), 0);
        for topic in ["default", "metrics"] {
            let stats = broker.topic_stats(topic).await.unwrap();
            assert_eq!(stats.subscription_count, 0);
        }
        assert!(matches!(
            broker.publish("default", "nobody").await,
            Err(Error::NoSubscribers(_))
        ));
    }

    #[tokio::test]
    async fn test_shutdown_notice_reaches_registered_clients() {
        let broker = create_test_broker();
        let (tx, mut rx) = mpsc::channel(8);
        let id = broker.next_client_id();
        broker
            .register_client(ClientEntry::new(
                id,
                Role::Publisher,
                "127.0.0.1:9".parse().unwrap(),
                tx,
            ))
            .unwrap();

        assert_eq!(broker.shutdown_notice("broker shutting down"), 1);
        assert_eq!(rx.recv().await.unwrap(), Frame::error("broker shutting down"));
    }
}
