//! Publine Types - Core domain types for the broker
//!
//! This crate contains the types shared by every Publine component,
//! including the line protocol codec.

pub mod client;
pub mod error;
pub mod item;
pub mod protocol;
pub mod topic;

// Re-export commonly used types
pub use client::{ClientId, ClientIdGenerator, Role};
pub use error::{Error, ErrorKind, Result};
pub use item::{Item, ItemId};
pub use protocol::{Command, DecodeError, Frame, Payload};
pub use topic::{TopicId, TopicInfo, TopicStats};
