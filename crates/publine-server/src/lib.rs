//! Publine Server - TCP front end for the broker
//!
//! [`Server`] binds a listener, spawns one task per accepted connection and
//! stops all of them on [`Server::stop`].

pub mod config;
pub mod logging;

mod connection;

use std::net::SocketAddr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use publine_core::Broker;
use publine_types::{ClientId, Error, Result};
use tokio::net::{TcpListener, ToSocketAddrs};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

pub use crate::config::{load_config, LogFormat, LogSettings, ServerSettings, Settings};

use connection::{handle_connection, ConnectionContext};

/// Reason sent to live connections when the server stops
pub const SHUTDOWN_REASON: &str = "broker shutting down";

/// A live TCP connection
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub peer: SocketAddr,
    pub connected_at: DateTime<Utc>,
}

/// TCP listener plus the tasks serving its connections
pub struct Server {
    broker: Arc<Broker>,
    max_line_bytes: usize,
    write_queue_capacity: usize,
    connections: Arc<DashMap<ClientId, ConnectionInfo>>,
    shutdown: watch::Sender<bool>,
    accept_task: Mutex<Option<JoinHandle<()>>>,
}

impl Server {
    /// Create a server for `broker` with default limits
    pub fn new(broker: Arc<Broker>) -> Self {
        let (shutdown, _) = watch::channel(false);
        let defaults = ServerSettings::default();
        Self {
            broker,
            max_line_bytes: defaults.max_line_bytes,
            write_queue_capacity: defaults.write_queue_capacity,
            connections: Arc::new(DashMap::new()),
            shutdown,
            accept_task: Mutex::new(None),
        }
    }

    /// Build a server and its broker from loaded settings
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        settings.validate()?;
        let broker = Broker::with_topics(settings.broker.topics.iter().cloned())?;
        Ok(Self::new(Arc::new(broker))
            .with_max_line_bytes(settings.server.max_line_bytes)
            .with_write_queue_capacity(settings.server.write_queue_capacity))
    }

    /// Longest accepted request line, terminator included
    pub fn with_max_line_bytes(mut self, max_line_bytes: usize) -> Self {
        self.max_line_bytes = max_line_bytes;
        self
    }

    /// Replies a connection may have queued before its read loop waits.
    /// Zero is treated as one.
    pub fn with_write_queue_capacity(mut self, capacity: usize) -> Self {
        self.write_queue_capacity = capacity.max(1);
        self
    }

    /// The broker shared by every connection
    pub fn broker(&self) -> &Arc<Broker> {
        &self.broker
    }

    /// Number of open TCP connections, registered or not
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Snapshot of the live connections
    pub fn connections(&self) -> Vec<(ClientId, ConnectionInfo)> {
        self.connections
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect()
    }

    /// Bind `addr` and start accepting connections in the background.
    /// Returns the bound address, which matters when binding port 0.
    pub async fn listen(&self, addr: impl ToSocketAddrs) -> Result<SocketAddr> {
        if self.accept_task.lock().is_some() {
            return Err(Error::Internal("server is already listening".into()));
        }

        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        info!(addr = %local_addr, "Publine broker listening");

        let ctx = ConnectionContext {
            broker: self.broker.clone(),
            connections: self.connections.clone(),
            max_line_bytes: self.max_line_bytes,
            write_queue_capacity: self.write_queue_capacity,
            shutdown: self.shutdown.subscribe(),
        };
        let handle = tokio::spawn(accept_loop(listener, ctx));

        let mut slot = self.accept_task.lock();
        if slot.is_some() {
            handle.abort();
            return Err(Error::Internal("server is already listening".into()));
        }
        *slot = Some(handle);
        Ok(local_addr)
    }

    /// Notify registered clients, close the listener and end every
    /// connection task.
    pub fn stop(&self) {
        let notified = self.broker.shutdown_notice(SHUTDOWN_REASON);
        info!(notified, "Stopping broker");
        self.shutdown.send_replace(true);
    }

    /// Wait for the accept loop to exit after [`Server::stop`]
    pub async fn wait(&self) {
        let handle = self.accept_task.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!(error = %e, "Accept loop panicked");
            }
        }
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.shutdown.send_replace(true);
    }
}

async fn accept_loop(listener: TcpListener, ctx: ConnectionContext) {
    let mut shutdown = ctx.shutdown.clone();
    if *shutdown.borrow_and_update() {
        return;
    }

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    if let Err(e) = stream.set_nodelay(true) {
                        debug!(peer = %peer, error = %e, "Failed to set TCP_NODELAY");
                    }
                    tokio::spawn(handle_connection(stream, peer, ctx.clone()));
                }
                Err(e) => {
                    warn!(error = %e, "Failed to accept connection");
                }
            },
        }
    }

    info!("Listener closed");
}
