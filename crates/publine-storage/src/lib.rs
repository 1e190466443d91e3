//! Publine Storage - Topic registry and subscription queues
//!
//! This crate provides the topic store behind the broker.
//! Currently supports:
//! - In-memory storage (default)

pub mod subscription;
pub mod topic;
pub mod traits;

#[cfg(feature = "memory")]
pub mod memory;

// Re-exports
pub use subscription::Subscription;
pub use topic::Topic;
pub use traits::TopicStore;

#[cfg(feature = "memory")]
pub use memory::MemoryStore;
