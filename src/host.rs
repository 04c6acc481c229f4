//! Boundary types between the host application and the bridge.
//!
//! The bridge consumes a stream of [`HostEvent`]s and calls back into the
//! host through a [`CommandProcessor`]. Neither side defines the event
//! vocabulary or the command grammar; that stays with the host.

use chrono::NaiveDateTime;
use std::fmt;
use thiserror::Error;

/// One application event on its way to the broker.
///
/// `kind` labels the event class for logging; `text` is the serialized form
/// the host wants published. The timestamp records when the event entered
/// the bridge, not when it was delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostEvent {
    kind: String,
    text: String,
    timestamp: NaiveDateTime,
}

impl HostEvent {
    pub fn new(kind: impl Into<String>, text: impl Into<String>) -> Self {
        HostEvent {
            kind: kind.into(),
            text: text.into(),
            timestamp: chrono::Local::now().naive_local(),
        }
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

impl fmt::Display for HostEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}] {}", self.timestamp, self.kind, self.text)
    }
}

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("unknown command: {0}")]
    UnknownCommand(String),
    #[error("command failed: {0}")]
    Failed(String),
}

/// Host-side command interface the bridge relays inbound commands to.
///
/// Implementations receive the command line without its leading slash and
/// return whatever textual output the command produced.
pub trait CommandProcessor: Send + Sync + 'static {
    fn execute(&mut self, command_line: &[u8]) -> Result<Vec<u8>, CommandError>;
}
