//! # MQTT Client Module
//!
//! A minimal QoS 0 client for one broker connection: plain TCP transport,
//! clean-session handshake, periodic keepalive pings, single-filter
//! subscription. Reliability beyond QoS 0 is out of scope, which keeps the
//! whole client free of retransmission state.
//!
//! ## Module Architecture
//!
//! ```text
//! client/
//! ├── error.rs      - Failure taxonomy for a broker session
//! ├── session.rs    - Sans-I/O state machine (handshake, keepalive, packets)
//! └── connection.rs - TCP transport driving the session
//! ```
//!
//! The session never touches a socket and the connection never interprets a
//! packet. Everything time-dependent takes the current instant as a
//! parameter, so the full lifecycle runs in tests without a broker.

pub mod connection;
pub mod error;
pub mod session;

pub use connection::Connection;
pub use error::ClientError;
pub use session::{ConnectionState, Session, SessionEvent};
