//! # Bridge Module
//!
//! Connects a SIP softphone's event stream to an MQTT broker: outbound
//! application events become QoS 0 publishes, inbound messages on the
//! configured topic can reach the host command interface. One worker task
//! owns the connection; the host only ever touches a channel sender and a
//! handle.
//!
//! ## Module Architecture
//!
//! ```text
//! bridge/
//! ├── error.rs  - Startup and shutdown failure taxonomy
//! ├── router.rs - Routing policy (publish topic, command relay)
//! └── worker.rs - Worker state machine, select loop and task handle
//! ```
//!
//! ## Lifecycle
//!
//! [`BridgeHandle::spawn`] validates the configuration, dials the broker
//! and spawns the worker. From then on the worker's periodic tick drives
//! the handshake, keepalive and inbound dispatch until
//! [`BridgeHandle::shutdown`] cancels it, which closes the session before
//! the task exits. Connection loss after startup is logged and leaves the
//! bridge idle; there is no automatic reconnect.

pub mod error;
pub mod router;
pub mod worker;

pub use error::BridgeError;
pub use router::EventRouter;
pub use worker::{BridgeHandle, BridgeStats, BridgeWorker};
