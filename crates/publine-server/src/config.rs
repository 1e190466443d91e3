//! Server configuration
//!
//! Settings are layered: built-in defaults, then an optional file, then
//! `PUBLINE__`-prefixed environment variables, e.g.
//! `PUBLINE__SERVER__PORT=4000` or `PUBLINE__BROKER__TOPICS=default,metrics`.

use std::collections::HashSet;
use std::path::Path;

use config::{Config, ConfigError, Environment, File};
use publine_types::{Error, Result};
use serde::Deserialize;

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub broker: BrokerSettings,
    pub log: LogSettings,
}

/// Listener settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// Longest accepted request line, terminator included
    pub max_line_bytes: usize,
    /// Replies a connection may have queued before its read loop waits
    pub write_queue_capacity: usize,
}

impl ServerSettings {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            max_line_bytes: 64 * 1024,
            write_queue_capacity: 32,
        }
    }
}

/// Broker settings. The topic set is fixed for the life of the process.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BrokerSettings {
    pub topics: Vec<String>,
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            topics: vec!["default".to_string()],
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// Filter directive used when `RUST_LOG` is unset
    pub level: String,
    pub format: LogFormat,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

impl Settings {
    /// Reject settings the broker cannot start with
    pub fn validate(&self) -> Result<()> {
        if self.broker.topics.is_empty() {
            return Err(Error::Config("at least one topic must be configured".into()));
        }

        let mut seen = HashSet::new();
        for topic in &self.broker.topics {
            if topic.trim().is_empty() {
                return Err(Error::Config("topic names must not be empty".into()));
            }
            if !seen.insert(topic.as_str()) {
                return Err(Error::TopicAlreadyExists(topic.clone()));
            }
        }

        if self.server.max_line_bytes == 0 {
            return Err(Error::Config("server.max_line_bytes must be positive".into()));
        }

        if self.server.write_queue_capacity == 0 {
            return Err(Error::Config(
                "server.write_queue_capacity must be positive".into(),
            ));
        }

        Ok(())
    }
}

/// Load settings from `path` (or `config/default` when absent) and the
/// environment.
pub fn load_config(path: Option<&Path>) -> std::result::Result<Settings, ConfigError> {
    let file = match path {
        Some(path) => File::from(path).required(true),
        None => File::with_name("config/default").required(false),
    };

    Config::builder()
        .add_source(file)
        .add_source(
            Environment::with_prefix("PUBLINE")
                .prefix_separator("__")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("broker.topics")
                .try_parsing(true),
        )
        .build()?
        .try_deserialize()
}
