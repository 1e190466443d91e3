//! Error types for Publine
//!
//! Defines all error types used throughout the broker, together with the
//! classification that decides whether a failure ends a client session.

use thiserror::Error;

use crate::client::Role;
use crate::protocol::{Command, DecodeError};

/// Main error type for Publine operations
#[derive(Error, Debug)]
pub enum Error {
    /// The request line could not be decoded
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// A broker-to-client command was sent by a client
    #[error("unexpected command: {0}")]
    UnexpectedCommand(Command),

    /// Request line exceeded the configured limit
    #[error("line exceeds {0} bytes")]
    LineTooLong(usize),

    /// Role-specific command issued before registration
    #[error("must register as a publisher or subscriber first")]
    NotRegistered,

    /// Command requires the other role
    #[error("must be registered as a {expected}")]
    WrongRole { expected: Role },

    /// Connection already committed to a role
    #[error("already registered as a {0}")]
    AlreadyRegistered(Role),

    /// Topic is not configured on this broker
    #[error("topic not found: {0}")]
    TopicNotFound(String),

    /// Topic name configured twice
    #[error("topic already exists: {0}")]
    TopicAlreadyExists(String),

    /// Publish reached a topic without subscriptions
    #[error("no active subscriptions")]
    NoSubscribers(String),

    /// Subscription queue has nothing to hand out
    #[error("no items in the queue")]
    QueueEmpty(String),

    /// Caller holds no subscription on the topic
    #[error("not subscribed to topic: {0}")]
    NotSubscribed(String),

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// Socket failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type alias for Publine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Broad classes of failure, used to decide how a session reacts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed or out-of-place protocol traffic
    Protocol,
    /// Command not permitted for the connection's role
    Authorization,
    /// Expected outcome of a single command, reported to the caller
    Domain,
    /// Socket level failure
    Transport,
    /// Startup configuration problem
    Configuration,
    /// Broker misuse or broken internal invariant
    Internal,
}

impl Error {
    /// Classify the error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Decode(_) | Error::UnexpectedCommand(_) | Error::LineTooLong(_) => {
                ErrorKind::Protocol
            }
            Error::NotRegistered | Error::WrongRole { .. } => ErrorKind::Authorization,
            Error::AlreadyRegistered(_)
            | Error::TopicNotFound(_)
            | Error::NoSubscribers(_)
            | Error::QueueEmpty(_)
            | Error::NotSubscribed(_) => ErrorKind::Domain,
            Error::Io(_) => ErrorKind::Transport,
            Error::TopicAlreadyExists(_) | Error::Config(_) => ErrorKind::Configuration,
            Error::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Whether the session that hit this error must be closed
    pub fn is_fatal(&self) -> bool {
        self.kind() != ErrorKind::Domain
    }
}
