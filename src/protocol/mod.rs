//! # MQTT Protocol Module
//!
//! Pure protocol building blocks with no I/O: the control packet codec and
//! the topic filter matcher. Everything here is a plain transformation over
//! byte slices and strings, which keeps it testable without sockets and
//! shared between the client and the broker stand-ins used in tests.
//!
//! ```text
//! protocol/
//! ├── packet.rs - control packet framing (encode/decode, remaining length)
//! └── topic.rs  - subscription filter matching and validity checks
//! ```

pub mod packet;
pub mod topic;

pub use packet::{ConnAck, Connect, Decoded, Packet, PacketType, Publish, SubAck, Subscribe, WireError};
