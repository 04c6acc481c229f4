//! # sipmq
//!
//! MQTT bridge for SIP softphone events with a built-in QoS 0 client.
//! Application events go out as publishes on one configured topic; inbound
//! messages on that topic can optionally be relayed to the host's command
//! interface. The client speaks MQTT 3.1.1 with clean sessions, QoS 0 only
//! and no automatic reconnect, which keeps it free of retransmission and
//! session-resumption state.
//!
//! ## Architecture
//!
//! ```text
//! HostEvent ──► bridge::BridgeWorker ──► client::Connection ──► broker
//!                      │                        │
//!              bridge::EventRouter ◄── client::SessionEvent
//!                      │
//!              host::CommandProcessor
//! ```
//!
//! The protocol layer (`protocol::packet`, `protocol::topic`) is plain
//! data-in data-out and usable on its own; everything async lives in
//! `client` and `bridge`.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use sipmq::bridge::BridgeHandle;
//! use sipmq::config::BridgeConfig;
//! use sipmq::host::{CommandError, CommandProcessor, HostEvent};
//! use tokio::sync::mpsc;
//!
//! struct Echo;
//!
//! impl CommandProcessor for Echo {
//!     fn execute(&mut self, command_line: &[u8]) -> Result<Vec<u8>, CommandError> {
//!         Ok(command_line.to_vec())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = BridgeConfig::default();
//!     let (events, events_rx) = mpsc::channel(100);
//!     let mut bridge = BridgeHandle::spawn(config, events_rx, Box::new(Echo)).await?;
//!
//!     let _ = events
//!         .send(HostEvent::new("register", "registered with provider"))
//!         .await;
//!
//!     bridge.shutdown().await?;
//!     Ok(())
//! }
//! ```

pub mod bridge;
pub mod client;
pub mod config;
pub mod host;
pub mod protocol;

pub use bridge::{BridgeError, BridgeHandle};
pub use config::BridgeConfig;
pub use host::{CommandError, CommandProcessor, HostEvent};
