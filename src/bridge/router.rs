//! Routing policy between host application and broker.
//!
//! Everything opinionated lives here: which topic carries events, what
//! happens once the session is up, and whether inbound messages may reach
//! the host command interface. The surrounding worker stays a plain
//! scheduler.

use crate::client::Connection;
use crate::config::BridgeConfig;
use crate::host::{CommandProcessor, HostEvent};
use crate::protocol::{topic, Publish};
use tracing::{debug, info, warn};

pub struct EventRouter {
    topic: String,
    command_relay: bool,
    processor: Box<dyn CommandProcessor>,
}

impl EventRouter {
    pub fn new(config: &BridgeConfig, processor: Box<dyn CommandProcessor>) -> Self {
        if config.command_relay {
            // Inherited trust model: every publisher on the topic may run
            // host commands once this flag is on.
            warn!(
                "command relay enabled, publishers on {:?} can execute host commands",
                config.topic
            );
        }
        Self {
            topic: config.topic.clone(),
            command_relay: config.command_relay,
            processor,
        }
    }

    /// Publishes one host event, fire and forget. Transport trouble is
    /// logged and swallowed; the event source must never see it. The
    /// returned flag only feeds the worker's counters.
    pub async fn relay_event(&self, conn: &mut Connection, event: HostEvent) -> bool {
        debug!("relaying host event: {}", event);
        match conn.publish(&self.topic, event.text().as_bytes()).await {
            Ok(()) => true,
            Err(e) => {
                warn!("event [{}] not published: {}", event.kind(), e);
                false
            }
        }
    }

    /// Session-established hook: subscribe to the configured topic and
    /// announce readiness on it.
    pub async fn on_connected(&self, conn: &mut Connection) {
        info!("session up, subscribing to {}", self.topic);
        if let Err(e) = conn.subscribe(&self.topic).await {
            warn!("subscription on {} failed: {}", self.topic, e);
            return;
        }
        if let Err(e) = conn.publish(&self.topic, b"ready").await {
            warn!("readiness publish failed: {}", e);
        }
    }

    /// Inbound message hook. Messages outside the configured topic are
    /// dropped; matched payloads starting with `/` carry a command line
    /// for the host, everything else is logged as unhandled. Returns
    /// whether a command was handed to the processor.
    pub fn on_message(&mut self, publish: &Publish) -> bool {
        if !topic::matches(&self.topic, &publish.topic) {
            debug!("ignoring publish on unmatched topic {}", publish.topic);
            return false;
        }
        match publish.payload.split_first() {
            Some((b'/', command_line)) if self.command_relay => {
                let command = String::from_utf8_lossy(command_line).into_owned();
                info!("running relayed command: {}", command);
                match self.processor.execute(command_line) {
                    Ok(output) => {
                        info!(
                            "command {} output: {}",
                            command,
                            String::from_utf8_lossy(&output)
                        );
                    }
                    Err(e) => warn!("command {} failed: {}", command, e),
                }
                true
            }
            Some((b'/', _)) => {
                debug!(
                    "command relay disabled, dropping command payload on {}",
                    publish.topic
                );
                false
            }
            _ => {
                debug!(
                    "unhandled message on {}: {}",
                    publish.topic,
                    String::from_utf8_lossy(&publish.payload)
                );
                false
            }
        }
    }
}
