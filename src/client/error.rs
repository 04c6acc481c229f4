use crate::protocol::{PacketType, WireError};
use thiserror::Error;

/// Failure modes of one broker session.
///
/// Fatal variants leave the session in the disconnected state; there is no
/// automatic reconnect, the owner decides whether to build a new session.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("transport failure: {0}")]
    Transport(#[from] std::io::Error),

    #[error("broker rejected the connection: {reason} (code {code})")]
    ConnectRejected { code: u8, reason: &'static str },

    #[error("broker did not acknowledge the connection within the keepalive interval")]
    ConnectTimeout,

    #[error("malformed packet from broker: {0}")]
    Malformed(#[from] WireError),

    #[error("broker sent an unexpected {0:?} packet")]
    UnexpectedPacket(PacketType),

    #[error("keepalive expired without a response from the broker")]
    KeepaliveTimeout,

    #[error("not connected to a broker")]
    NotConnected,

    #[error("broker closed the connection")]
    ConnectionClosed,
}
