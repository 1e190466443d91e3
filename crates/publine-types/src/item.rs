//! Item types for Publine
//!
//! An `Item` is one published unit of data as held in a subscription queue.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for an item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemId(pub Uuid);

impl ItemId {
    /// Create a new random ItemId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ItemId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A published item. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    id: ItemId,
    payload: Bytes,
    published_at: DateTime<Utc>,
}

impl Item {
    /// Create a new item with a fresh id
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self {
            id: ItemId::new(),
            payload: payload.into(),
            published_at: Utc::now(),
        }
    }

    pub fn id(&self) -> ItemId {
        self.id
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn published_at(&self) -> DateTime<Utc> {
        self.published_at
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Get the payload as a string (if valid UTF-8)
    pub fn payload_as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.payload).ok()
    }

    /// Payload as text for the wire, replacing invalid UTF-8
    pub fn to_message(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_creation() {
        let item = Item::new("Hello World!");
        assert_eq!(item.payload_as_str(), Some("Hello World!"));
        assert_eq!(item.len(), 12);
        assert!(!item.is_empty());
    }

    #[test]
    fn test_items_get_distinct_ids() {
        let a = Item::new("a");
        let b = Item::new("a");
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_clone_shares_identity() {
        let item = Item::new(vec![0xff, 0xfe]);
        let copy = item.clone();
        assert_eq!(copy, item);
        assert_eq!(copy.payload_as_str(), None);
        assert_eq!(copy.to_message(), "\u{fffd}\u{fffd}");
    }
}
