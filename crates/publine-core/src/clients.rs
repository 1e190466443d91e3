//! Client registry
//!
//! Maps connection ids to the role each connection registered with. A single
//! coarse lock covers insert, delete and lookup.

use std::collections::HashMap;
use std::net::SocketAddr;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use publine_types::{ClientId, Error, Frame, Result, Role};
use tokio::sync::mpsc;
use tracing::debug;

/// Bounded output channel feeding a connection's writer task
pub type FrameSink = mpsc::Sender<Frame>;

/// A registered connection
#[derive(Debug, Clone)]
pub struct ClientEntry {
    pub id: ClientId,
    pub role: Role,
    pub peer: SocketAddr,
    pub registered_at: DateTime<Utc>,
    sink: FrameSink,
}

impl ClientEntry {
    pub fn new(id: ClientId, role: Role, peer: SocketAddr, sink: FrameSink) -> Self {
        Self {
            id,
            role,
            peer,
            registered_at: Utc::now(),
            sink,
        }
    }

    /// Queue a frame without waiting. Returns false when the writer is gone
    /// or its queue is full.
    pub fn try_send(&self, frame: Frame) -> bool {
        self.sink.try_send(frame).is_ok()
    }
}

#[derive(Debug, Default)]
pub struct ClientRegistry {
    clients: Mutex<HashMap<ClientId, ClientEntry>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection. A connection can only register once.
    pub fn register(&self, entry: ClientEntry) -> Result<()> {
        let mut clients = self.clients.lock();
        if let Some(existing) = clients.get(&entry.id) {
            return Err(Error::AlreadyRegistered(existing.role));
        }
        clients.insert(entry.id, entry);
        Ok(())
    }

    /// Remove a connection, returning its entry if it was registered
    pub fn unregister(&self, id: ClientId) -> Option<ClientEntry> {
        let entry = self.clients.lock().remove(&id);
        if let Some(entry) = &entry {
            let registered_secs = (Utc::now() - entry.registered_at).num_seconds();
            debug!(client_id = %id, role = %entry.role, registered_secs, "Client unregistered");
        }
        entry
    }

    /// Role of a registered connection
    pub fn role_of(&self, id: ClientId) -> Result<Role> {
        self.clients
            .lock()
            .get(&id)
            .map(|entry| entry.role)
            .ok_or(Error::NotRegistered)
    }

    pub fn len(&self) -> usize {
        self.clients.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.lock().is_empty()
    }

    /// Push a frame to every registered connection; returns how many
    /// accepted it. Connections whose queue is full are skipped.
    pub fn notify_all(&self, frame: &Frame) -> usize {
        self.clients
            .lock()
            .values()
            .filter(|entry| entry.try_send(frame.clone()))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer() -> SocketAddr {
        "127.0.0.1:40000".parse().unwrap()
    }

    #[test]
    fn test_register_and_lookup() {
        let registry = ClientRegistry::new();
        let (tx, _rx) = mpsc::channel(8);

        registry
            .register(ClientEntry::new(ClientId(1), Role::Publisher, peer(), tx))
            .unwrap();

        assert_eq!(registry.role_of(ClientId(1)).unwrap(), Role::Publisher);
        assert!(matches!(
            registry.role_of(ClientId(2)),
            Err(Error::NotRegistered)
        ));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_register_twice_rejected() {
        let registry = ClientRegistry::new();
        let (tx, _rx) = mpsc::channel(8);

        registry
            .register(ClientEntry::new(ClientId(1), Role::Subscriber, peer(), tx.clone()))
            .unwrap();
        let err = registry
            .register(ClientEntry::new(ClientId(1), Role::Publisher, peer(), tx))
            .unwrap_err();

        assert!(matches!(err, Error::AlreadyRegistered(Role::Subscriber)));
        assert_eq!(registry.role_of(ClientId(1)).unwrap(), Role::Subscriber);
    }

    #[test]
    fn test_unregister() {
        let registry = ClientRegistry::new();
        let (tx, _rx) = mpsc::channel(8);
        registry
            .register(ClientEntry::new(ClientId(1), Role::Publisher, peer(), tx))
            .unwrap();

        let entry = registry.unregister(ClientId(1)).unwrap();
        assert_eq!(entry.role, Role::Publisher);
        assert!(entry.registered_at <= Utc::now());
        assert!(registry.unregister(ClientId(1)).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_notify_all_skips_closed_sinks() {
        let registry = ClientRegistry::new();
        let (open_tx, mut open_rx) = mpsc::channel(8);
        let (closed_tx, closed_rx) = mpsc::channel(8);
        drop(closed_rx);

        registry
            .register(ClientEntry::new(ClientId(1), Role::Publisher, peer(), open_tx))
            .unwrap();
        registry
            .register(ClientEntry::new(ClientId(2), Role::Subscriber, peer(), closed_tx))
            .unwrap();

        assert_eq!(registry.notify_all(&Frame::error("bye")), 1);
        assert_eq!(open_rx.try_recv().unwrap(), Frame::error("bye"));
    }

    #[test]
    fn test_notify_all_skips_full_sinks() {
        let registry = ClientRegistry::new();
        let (tx, mut rx) = mpsc::channel(1);
        registry
            .register(ClientEntry::new(ClientId(1), Role::Subscriber, peer(), tx))
            .unwrap();

        assert_eq!(registry.notify_all(&Frame::error("first")), 1);
        assert_eq!(registry.notify_all(&Frame::error("second")), 0);
        assert_eq!(rx.try_recv().unwrap(), Frame::error("first"));
        assert!(rx.try_recv().is_err());
    }
}
