//! Line protocol codec
//!
//! Every request and response is a single line of the form
//! `<COMMAND>[ <payload>]\n`, where the optional payload is a JSON object
//! with the fields `topic`, `message` and `error`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Command token at the start of every line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// Register the connection as a publisher
    PubReg,
    /// Register the connection as a subscriber
    SubReg,
    /// Publish a message to a topic
    Pub,
    /// Subscribe to a topic
    Sub,
    /// Drop a subscription
    Unsub,
    /// Pop the next item of a subscription
    Recv,
    /// Item delivered in answer to `RECV`
    Resp,
    /// Command succeeded
    Ok,
    /// Command failed
    Error,
}

impl Command {
    pub const ALL: [Command; 9] = [
        Command::PubReg,
        Command::SubReg,
        Command::Pub,
        Command::Sub,
        Command::Unsub,
        Command::Recv,
        Command::Resp,
        Command::Ok,
        Command::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Command::PubReg => "PUBREG",
            Command::SubReg => "SUBREG",
            Command::Pub => "PUB",
            Command::Sub => "SUB",
            Command::Unsub => "UNSUB",
            Command::Recv => "RECV",
            Command::Resp => "RESP",
            Command::Ok => "OK",
            Command::Error => "ERROR",
        }
    }

    /// Whether a payload is written after this token
    pub fn carries_payload(&self) -> bool {
        !matches!(self, Command::Ok | Command::PubReg | Command::SubReg)
    }

    /// Commands only the broker sends
    pub fn is_response(&self) -> bool {
        matches!(self, Command::Ok | Command::Error | Command::Resp)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Command {
    type Err = DecodeError;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        Command::ALL
            .into_iter()
            .find(|command| command.as_str() == token)
            .ok_or_else(|| DecodeError::UnknownCommand(token.to_string()))
    }
}

/// Failure to turn a line into a [`Frame`]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("invalid command: {0:?}")]
    UnknownCommand(String),

    #[error("malformed payload: {0}")]
    MalformedPayload(String),
}

/// Structured payload following the command token
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Payload {
    pub fn is_empty(&self) -> bool {
        self.topic.is_none() && self.message.is_none() && self.error.is_none()
    }

    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn require_topic(&self) -> Result<&str, DecodeError> {
        self.topic.as_deref().ok_or_else(|| missing("topic"))
    }

    pub fn require_message(&self) -> Result<&str, DecodeError> {
        self.message.as_deref().ok_or_else(|| missing("message"))
    }
}

fn missing(field: &str) -> DecodeError {
    DecodeError::MalformedPayload(format!("missing field `{field}`"))
}

/// One decoded protocol line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: Command,
    pub payload: Payload,
}

impl Frame {
    pub fn new(command: Command, payload: Payload) -> Self {
        Self { command, payload }
    }

    pub fn ok() -> Self {
        Self::new(Command::Ok, Payload::default())
    }

    pub fn error(error: impl Into<String>) -> Self {
        Self::new(Command::Error, Payload::default().with_error(error))
    }

    pub fn resp(message: impl Into<String>) -> Self {
        Self::new(Command::Resp, Payload::default().with_message(message))
    }

    pub fn pubreg() -> Self {
        Self::new(Command::PubReg, Payload::default())
    }

    pub fn subreg() -> Self {
        Self::new(Command::SubReg, Payload::default())
    }

    pub fn publish(topic: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(
            Command::Pub,
            Payload::default().with_topic(topic).with_message(message),
        )
    }

    pub fn subscribe(topic: impl Into<String>) -> Self {
        Self::new(Command::Sub, Payload::default().with_topic(topic))
    }

    pub fn unsubscribe(topic: impl Into<String>) -> Self {
        Self::new(Command::Unsub, Payload::default().with_topic(topic))
    }

    pub fn receive(topic: impl Into<String>) -> Self {
        Self::new(Command::Recv, Payload::default().with_topic(topic))
    }

    /// Parse one line. Surrounding whitespace, including the line
    /// terminator, is ignored.
    pub fn decode(line: &[u8]) -> Result<Self, DecodeError> {
        let line = trim(line);
        let (token, rest) = match line.iter().position(u8::is_ascii_whitespace) {
            Some(split) => (&line[..split], trim(&line[split..])),
            None => (line, &line[line.len()..]),
        };

        let command = std::str::from_utf8(token)
            .map_err(|_| DecodeError::UnknownCommand(String::from_utf8_lossy(token).into_owned()))?
            .parse::<Command>()?;

        let payload = if rest.is_empty() {
            Payload::default()
        } else {
            let value = serde_json::from_slice::<serde_json::Value>(rest)
                .map_err(|e| DecodeError::MalformedPayload(e.to_string()))?;
            if !value.is_object() {
                return Err(DecodeError::MalformedPayload(
                    "payload must be a JSON object".into(),
                ));
            }
            serde_json::from_value::<Payload>(value)
                .map_err(|e| DecodeError::MalformedPayload(e.to_string()))?
        };

        Ok(Self { command, payload })
    }

    /// Serialize to a terminated line
    pub fn encode(&self) -> String {
        format!("{self}\n")
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.command.as_str())?;
        if self.command.carries_payload() && !self.payload.is_empty() {
            let json = serde_json::to_string(&self.payload).map_err(|_| fmt::Error)?;
            write!(f, " {json}")?;
        }
        Ok(())
    }
}

fn trim(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    let end = bytes
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |last| last + 1);
    &bytes[start..end]
}
