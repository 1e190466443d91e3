//! Publine Core - Core business logic for the broker
//!
//! This crate contains:
//! - Broker: owner of the topic store and client registry
//! - ClientRegistry: connection id to role mapping
//! - Session: the per-connection protocol state machine

pub mod broker;
pub mod clients;
pub mod session;

// Re-exports
pub use broker::Broker;
pub use clients::{ClientEntry, ClientRegistry, FrameSink};
pub use session::{Disposition, Reply, Session};
