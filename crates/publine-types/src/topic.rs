//! Topic types for Publine
//!
//! Defines topic metadata and statistics types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a topic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TopicId(pub Uuid);

impl TopicId {
    /// Create a new random TopicId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TopicId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TopicId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Topic metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicInfo {
    /// Unique topic identifier
    pub id: TopicId,

    /// Topic name (unique within a broker)
    pub name: String,

    /// When the topic was configured
    pub created_at: DateTime<Utc>,
}

impl TopicInfo {
    /// Create metadata for a new topic
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: TopicId::new(),
            name: name.into(),
            created_at: Utc::now(),
        }
    }
}

/// Topic statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicStats {
    /// Number of active subscriptions
    pub subscription_count: u64,

    /// Items waiting across all subscription queues
    pub queued_items: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_creation() {
        let topic = TopicInfo::new("default");
        assert_eq!(topic.name, "default");
        assert_ne!(topic.id, TopicInfo::new("default").id);
    }
}
