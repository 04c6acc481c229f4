//! Bridge worker with statum state machine for the connection lifecycle.
//!
//! One tokio task owns the broker connection and everything that touches
//! it. Host events, inbound packets and keepalive deadlines all funnel
//! through this task's select loop, so no lock ever guards the connection.
//!
//! # State Machine
//!
//! ```text
//! Initializing ──► Running ──► Stopping ──► Stopped
//!    (connect)      (loop)      (close)
//! ```
//!
//! # Architecture
//!
//! ```text
//! HostEvent ──► [select loop] ──► Connection ──► broker
//!                    │                 │
//!               [EventRouter] ◄── SessionEvent
//! ```

use crate::bridge::error::BridgeError;
use crate::bridge::router::EventRouter;
use crate::client::{Connection, SessionEvent};
use crate::config::BridgeConfig;
use crate::host::{CommandProcessor, HostEvent};
use statum::{machine, state};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Lifetime counters for one bridge run.
#[derive(Debug, Default, Clone, Copy)]
pub struct BridgeStats {
    pub events_published: u64,
    pub messages_received: u64,
    pub commands_relayed: u64,
    pub publish_failures: u64,
}

/// States for the bridge lifecycle using statum
#[state]
#[derive(Debug, Clone)]
pub enum BridgeState {
    Initializing, // Built but not yet dialed
    Running,      // Driving the connection and relaying events
    Stopping,     // Select loop left, session still to close
    Stopped,      // Fully shut down
}

/// Bridge worker with compile-time state safety via statum
///
/// Owns the broker connection and the routing policy. Each state allows a
/// specific slice of the lifecycle, enforced at compile time.
#[machine]
pub struct BridgeWorker<S: BridgeState> {
    router: EventRouter,
    host_rx: mpsc::Receiver<HostEvent>,
    cancel: CancellationToken,
    connection: Option<Connection>,
    stats: BridgeStats,
    config: BridgeConfig,
}

impl BridgeWorker<Initializing> {
    pub fn create(
        config: BridgeConfig,
        processor: Box<dyn CommandProcessor>,
        host_rx: mpsc::Receiver<HostEvent>,
        cancel: CancellationToken,
    ) -> Self {
        info!(
            "initializing bridge for {}:{}",
            config.broker_host, config.broker_port
        );
        let router = EventRouter::new(&config, processor);

        Self::new(
            router,
            host_rx,
            cancel,
            None,                   // connection
            BridgeStats::default(), // stats
            config,
        )
    }

    /// Dials the broker and transitions to Running.
    ///
    /// Only the TCP connect and the outbound CONNECT happen here; the
    /// CONNACK is picked up by the running loop's first tick.
    pub async fn connect(mut self) -> Result<BridgeWorker<Running>, BridgeError> {
        let connection = Connection::open(
            &self.config.broker_host,
            self.config.broker_port,
            &self.config.client_id,
            self.config.keepalive_seconds,
            self.config.poll_window(),
        )
        .await?;

        self.connection = Some(connection);
        Ok(self.transition())
    }
}

impl BridgeWorker<Running> {
    /// Main loop until cancellation or a closed host channel.
    ///
    /// The interval's first tick fires immediately, so handshake
    /// processing starts without waiting out a full period. A dead
    /// connection does not end the loop; host events keep arriving and
    /// are dropped with a log line, there is no automatic reconnect.
    pub async fn run_until_cancelled(mut self) -> BridgeWorker<Stopping> {
        info!(
            "bridge running, tick interval {:?}",
            self.config.tick_interval()
        );
        let mut ticker = tokio::time::interval(self.config.tick_interval());

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("shutdown requested");
                    break;
                }

                maybe_event = self.host_rx.recv() => {
                    match maybe_event {
                        Some(event) => self.relay(event).await,
                        None => {
                            info!("host event channel closed");
                            break;
                        }
                    }
                }

                _ = ticker.tick() => {
                    self.drive_connection().await;
                }
            }
        }

        self.transition()
    }

    async fn relay(&mut self, event: HostEvent) {
        match self.connection.as_mut() {
            Some(conn) => {
                if self.router.relay_event(conn, event).await {
                    self.stats.events_published += 1;
                } else {
                    self.stats.publish_failures += 1;
                }
            }
            None => {
                warn!("no active connection, dropping event [{}]", event.kind());
                self.stats.publish_failures += 1;
            }
        }
    }

    async fn drive_connection(&mut self) {
        let Some(conn) = self.connection.as_mut() else {
            return;
        };
        match conn.tick().await {
            Ok(events) => {
                for event in events {
                    match event {
                        SessionEvent::Connected { session_present } => {
                            debug!("broker accepted session (present: {})", session_present);
                            self.router.on_connected(conn).await;
                        }
                        SessionEvent::Message(publish) => {
                            self.stats.messages_received += 1;
                            if self.router.on_message(&publish) {
                                self.stats.commands_relayed += 1;
                            }
                        }
                    }
                }
            }
            Err(e) => {
                error!("connection lost: {}", e);
                self.connection = None;
            }
        }
    }
}

impl BridgeWorker<Stopping> {
    /// Closes the session and transitions to Stopped.
    pub async fn shutdown(mut self) -> BridgeWorker<Stopped> {
        if let Some(conn) = self.connection.as_mut() {
            conn.close().await;
        }
        info!(
            "bridge stopped: {} events published, {} messages received, {} commands relayed, {} publish failures",
            self.stats.events_published,
            self.stats.messages_received,
            self.stats.commands_relayed,
            self.stats.publish_failures
        );
        self.transition()
    }
}

impl BridgeWorker<Stopped> {}

/// Handle for managing the bridge worker in a tokio task
///
/// The caller keeps the sending half of the event channel; dropping every
/// sender clone stops the worker just like an explicit shutdown call does.
#[derive(Debug)]
pub struct BridgeHandle {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl BridgeHandle {
    /// Validates the configuration, opens the broker connection and spawns
    /// the worker loop. Connection failures surface here, before any task
    /// exists.
    pub async fn spawn(
        config: BridgeConfig,
        events: mpsc::Receiver<HostEvent>,
        processor: Box<dyn CommandProcessor>,
    ) -> Result<Self, BridgeError> {
        config.validate()?;

        let cancel = CancellationToken::new();

        let worker = BridgeWorker::create(config, processor, events, cancel.clone());
        let running = worker.connect().await?;

        let task = tokio::spawn(async move {
            let stopping = running.run_until_cancelled().await;
            stopping.shutdown().await;
        });

        Ok(Self {
            cancel,
            task: Some(task),
        })
    }

    /// Cancels the worker and waits for it to finish closing the session.
    pub async fn shutdown(&mut self) -> Result<(), BridgeError> {
        debug!("requesting bridge shutdown");
        self.cancel.cancel();

        if let Some(handle) = self.task.take() {
            match handle.await {
                Ok(()) => {
                    debug!("bridge task completed");
                    Ok(())
                }
                Err(e) => {
                    error!("bridge task panicked: {}", e);
                    Err(BridgeError::TaskPanicked(e.to_string()))
                }
            }
        } else {
            debug!("bridge already shut down");
            Ok(())
        }
    }
}
