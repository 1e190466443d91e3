//! Per-connection protocol state machine
//!
//! A `Session` starts unregistered and commits to the publisher or the
//! subscriber role on its first successful `PUBREG`/`SUBREG`. Each request
//! line yields exactly one reply; protocol and authorization failures also
//! mark the session for closing.
//!
//! The session knows nothing about sockets. The transport feeds it lines,
//! writes the returned frames and calls [`Session::close`] once the
//! connection ends for any reason.

use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::sync::Arc;

use publine_types::{ClientId, Command, Error, Frame, Result, Role};
use tracing::{debug, info, warn};

use crate::broker::Broker;
use crate::clients::{ClientEntry, FrameSink};

/// What the transport should do after writing a reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Continue,
    Close,
}

/// Response to one request line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub frame: Frame,
    pub disposition: Disposition,
}

impl Reply {
    fn success(frame: Frame) -> Self {
        Self {
            frame,
            disposition: Disposition::Continue,
        }
    }

    /// `ERROR` reply; fatal errors close the session
    pub fn failure(err: &Error) -> Self {
        let disposition = if err.is_fatal() {
            Disposition::Close
        } else {
            Disposition::Continue
        };
        Self {
            frame: Frame::error(err.to_string()),
            disposition,
        }
    }

    /// Whether the connection ends after this reply
    pub fn is_close(&self) -> bool {
        self.disposition == Disposition::Close
    }
}

/// Protocol state of one connection
pub struct Session {
    id: ClientId,
    peer: SocketAddr,
    broker: Arc<Broker>,
    sink: FrameSink,
    role: Option<Role>,
    /// Topics this connection subscribed to, dropped again on close
    joined: BTreeSet<String>,
}

impl Session {
    /// Create an unregistered session with a fresh client id
    pub fn new(broker: Arc<Broker>, sink: FrameSink, peer: SocketAddr) -> Self {
        Self {
            id: broker.next_client_id(),
            peer,
            broker,
            sink,
            role: None,
            joined: BTreeSet::new(),
        }
    }

    pub fn id(&self) -> ClientId {
        self.id
    }

    /// Role once registered
    pub fn role(&self) -> Option<Role> {
        self.role
    }

    /// Topics holding a subscription for this session
    pub fn joined_topics(&self) -> impl Iterator<Item = &str> {
        self.joined.iter().map(String::as_str)
    }

    /// Decode and handle one raw request line
    pub async fn handle_line(&mut self, line: &[u8]) -> Reply {
        match Frame::decode(line) {
            Ok(frame) => self.handle(frame).await,
            Err(e) => {
                let err = Error::from(e);
                warn!(client_id = %self.id, peer = %self.peer, error = %err, "Undecodable request");
                Reply::failure(&err)
            }
        }
    }

    /// Handle one decoded request
    pub async fn handle(&mut self, frame: Frame) -> Reply {
        let command = frame.command;
        match self.dispatch(frame).await {
            Ok(reply) => {
                debug!(client_id = %self.id, command = %command, reply = %reply.command, "Request handled");
                Reply::success(reply)
            }
            Err(err) if err.is_fatal() => {
                warn!(client_id = %self.id, command = %command, error = %err, "Closing session");
                Reply::failure(&err)
            }
            Err(err) => {
                debug!(client_id = %self.id, command = %command, error = %err, "Request rejected");
                Reply::failure(&err)
            }
        }
    }

    async fn dispatch(&mut self, frame: Frame) -> Result<Frame> {
        let payload = &frame.payload;
        match frame.command {
            Command::PubReg => self.register(Role::Publisher),
            Command::SubReg => self.register(Role::Subscriber),
            Command::Pub => {
                self.require(Role::Publisher)?;
                let topic = payload.require_topic()?;
                let message = payload.require_message()?;
                self.broker.publish(topic, message.to_owned()).await?;
                Ok(Frame::ok())
            }
            Command::Sub => {
                self.require(Role::Subscriber)?;
                let topic = payload.require_topic()?;
                self.broker.subscribe(topic, self.id).await?;
                self.joined.insert(topic.to_owned());
                Ok(Frame::ok())
            }
            Command::Unsub => {
                self.require(Role::Subscriber)?;
                let topic = payload.require_topic()?;
                self.broker.unsubscribe(topic, self.id).await?;
                self.joined.remove(topic);
                Ok(Frame::ok())
            }
            Command::Recv => {
                self.require(Role::Subscriber)?;
                let topic = payload.require_topic()?;
                let item = self.broker.receive(topic, self.id).await?;
                Ok(Frame::resp(item.to_message()))
            }
            Command::Resp | Command::Ok | Command::Error => {
                self.broker.role_of(self.id)?;
                Err(Error::UnexpectedCommand(frame.command))
            }
        }
    }

    fn register(&mut self, role: Role) -> Result<Frame> {
        match self.broker.role_of(self.id) {
            Ok(current) if current == role => return Ok(Frame::ok()),
            Ok(current) => return Err(Error::AlreadyRegistered(current)),
            Err(_) => {}
        }

        self.broker
            .register_client(ClientEntry::new(self.id, role, self.peer, self.sink.clone()))?;
        self.role = Some(role);
        Ok(Frame::ok())
    }

    /// The client registry is the authority on the connection's role
    fn require(&self, expected: Role) -> Result<()> {
        let role = self.broker.role_of(self.id)?;
        if role != expected {
            return Err(Error::WrongRole { expected });
        }
        Ok(())
    }

    /// Unregister and drop every subscription this connection holds.
    /// Safe to call more than once.
    pub async fn close(&mut self) {
        let joined = std::mem::take(&mut self.joined);
        let removed = self
            .broker
            .disconnect(self.id, joined.iter().map(String::as_str))
            .await;
        self.role = None;
        info!(client_id = %self.id, peer = %self.peer, subscriptions = removed, "Session closed");
    }
}
