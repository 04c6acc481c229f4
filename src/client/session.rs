//! Sans-I/O session state machine for one broker connection.
//!
//! The [`Session`] owns every protocol decision (handshake progress,
//! keepalive deadlines, packet interpretation) but never touches a socket:
//! callers feed it received bytes plus the current instant and ship whatever
//! bytes it hands back. That split keeps the whole lifecycle testable with
//! plain buffers.
//!
//! Lifecycle: `Disconnected → Connecting → Connected → Disconnected`. A
//! failed session stays disconnected; building a replacement is the owner's
//! call, there is no automatic reconnect.

use crate::client::error::ClientError;
use crate::protocol::{ConnAck, Connect, Decoded, Packet, PacketType, Publish, SubAck, Subscribe};
use bytes::{Buf, Bytes, BytesMut};
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        };
        f.write_str(label)
    }
}

/// Activity the session reports back to its owner after interpreting
/// inbound bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// CONNACK accepted; the session is live.
    Connected { session_present: bool },
    /// Application message delivered by the broker.
    Message(Publish),
}

pub struct Session {
    state: ConnectionState,
    client_id: String,
    keepalive_secs: u16,
    rx: BytesMut,
    last_tx: Instant,
    last_rx: Instant,
    ping_sent: Option<Instant>,
    connect_started: Option<Instant>,
    next_packet_id: u16,
}

impl Session {
    pub fn new(client_id: impl Into<String>, keepalive_secs: u16, now: Instant) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            client_id: client_id.into(),
            keepalive_secs,
            rx: BytesMut::new(),
            last_tx: now,
            last_rx: now,
            ping_sent: None,
            connect_started: None,
            next_packet_id: 1,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    fn keepalive(&self) -> Duration {
        Duration::from_secs(u64::from(self.keepalive_secs))
    }

    fn fail(&mut self, err: ClientError) -> ClientError {
        self.mark_disconnected();
        err
    }

    /// Drops all session progress, e.g. after the transport went away.
    pub fn mark_disconnected(&mut self) {
        self.state = ConnectionState::Disconnected;
        self.ping_sent = None;
        self.connect_started = None;
        self.rx.clear();
    }

    /// Frames the CONNECT packet and moves into `Connecting`.
    ///
    /// Valid once per session; a failed session is replaced, not restarted.
    pub fn start_connect(&mut self, now: Instant) -> Result<Bytes, ClientError> {
        let packet = Packet::Connect(Connect {
            client_id: self.client_id.clone(),
            keepalive_secs: self.keepalive_secs,
            clean_session: true,
        });
        let bytes = packet.encode()?;
        self.state = ConnectionState::Connecting;
        self.connect_started = Some(now);
        self.last_tx = now;
        self.last_rx = now;
        debug!("CONNECT framed for client {}", self.client_id);
        Ok(bytes)
    }

    /// Ingests freshly received bytes and interprets every complete packet.
    ///
    /// Any inbound traffic clears an outstanding PINGREQ. Errors are fatal:
    /// the session drops back to `Disconnected` before they are returned,
    /// since a framing desync cannot be recovered mid-stream.
    pub fn receive(&mut self, data: &[u8], now: Instant) -> Result<Vec<SessionEvent>, ClientError> {
        self.rx.extend_from_slice(data);
        let mut events = Vec::new();

        loop {
            let (packet, consumed) = match Packet::decode(&self.rx) {
                Ok(Decoded::Packet(packet, consumed)) => (packet, consumed),
                Ok(Decoded::NeedMore) => break,
                Err(e) => return Err(self.fail(ClientError::Malformed(e))),
            };
            self.rx.advance(consumed);
            self.last_rx = now;
            self.ping_sent = None;

            match packet {
                Packet::ConnAck(ack) => {
                    if self.state != ConnectionState::Connecting {
                        return Err(self.fail(ClientError::UnexpectedPacket(PacketType::ConnAck)));
                    }
                    if ack.return_code != ConnAck::ACCEPTED {
                        return Err(self.fail(ClientError::ConnectRejected {
                            code: ack.return_code,
                            reason: ConnAck::reason(ack.return_code),
                        }));
                    }
                    self.state = ConnectionState::Connected;
                    self.connect_started = None;
                    info!(
                        "session established for {} (session present: {})",
                        self.client_id, ack.session_present
                    );
                    events.push(SessionEvent::Connected {
                        session_present: ack.session_present,
                    });
                }
                Packet::Publish(publish) => {
                    if self.state != ConnectionState::Connected {
                        return Err(self.fail(ClientError::UnexpectedPacket(PacketType::Publish)));
                    }
                    debug!(
                        "inbound publish on {} ({} bytes)",
                        publish.topic,
                        publish.payload.len()
                    );
                    events.push(SessionEvent::Message(publish));
                }
                Packet::SubAck(ack) => {
                    if self.state != ConnectionState::Connected {
                        return Err(self.fail(ClientError::UnexpectedPacket(PacketType::SubAck)));
                    }
                    if ack.return_code == SubAck::FAILURE {
                        warn!(
                            "broker refused subscription (packet id {})",
                            ack.packet_id
                        );
                    } else {
                        debug!("subscription acknowledged (packet id {})", ack.packet_id);
                    }
                }
                Packet::PingResp => {
                    if self.state != ConnectionState::Connected {
                        return Err(self.fail(ClientError::UnexpectedPacket(PacketType::PingResp)));
                    }
                    debug!("pong from broker");
                }
                other => {
                    return Err(self.fail(ClientError::UnexpectedPacket(other.packet_type())));
                }
            }
        }

        Ok(events)
    }

    /// Checks the clock-driven deadlines; called from the periodic tick.
    ///
    /// While connected, one PINGREQ is framed after a full keepalive
    /// interval of outbound silence. If no traffic at all arrives within a
    /// further interval the session fails with `KeepaliveTimeout`, exactly
    /// once. A handshake that never sees CONNACK fails the same way with
    /// `ConnectTimeout`.
    pub fn poll_keepalive(&mut self, now: Instant) -> Result<Option<Bytes>, ClientError> {
        if self.keepalive_secs == 0 {
            return Ok(None);
        }
        match self.state {
            ConnectionState::Connecting => {
                if let Some(started) = self.connect_started {
                    if now.duration_since(started) >= self.keepalive() {
                        warn!("no CONNACK from broker within {:?}", self.keepalive());
                        return Err(self.fail(ClientError::ConnectTimeout));
                    }
                }
                Ok(None)
            }
            ConnectionState::Connected => {
                if let Some(sent) = self.ping_sent {
                    if now.duration_since(sent) >= self.keepalive() {
                        warn!(
                            "broker silent through the grace window after PINGREQ, last traffic {:?} ago",
                            now.duration_since(self.last_rx)
                        );
                        return Err(self.fail(ClientError::KeepaliveTimeout));
                    }
                    Ok(None)
                } else if now.duration_since(self.last_tx) >= self.keepalive() {
                    debug!("idle for {:?}, sending PINGREQ", self.keepalive());
                    let bytes = Packet::PingReq.encode()?;
                    self.ping_sent = Some(now);
                    self.last_tx = now;
                    Ok(Some(bytes))
                } else {
                    Ok(None)
                }
            }
            ConnectionState::Disconnected => Ok(None),
        }
    }

    /// Frames a QoS 0 PUBLISH. Only valid while connected; otherwise the
    /// caller gets `NotConnected` and no bytes.
    pub fn publish(&mut self, topic: &str, payload: &[u8], now: Instant) -> Result<Bytes, ClientError> {
        if self.state != ConnectionState::Connected {
            return Err(ClientError::NotConnected);
        }
        let packet = Packet::Publish(Publish {
            topic: topic.to_owned(),
            payload: Bytes::copy_from_slice(payload),
            retain: false,
        });
        let bytes = packet.encode()?;
        self.last_tx = now;
        Ok(bytes)
    }

    /// Frames a SUBSCRIBE for one filter at QoS 0.
    pub fn subscribe(&mut self, filter: &str, now: Instant) -> Result<Bytes, ClientError> {
        if self.state != ConnectionState::Connected {
            return Err(ClientError::NotConnected);
        }
        let packet_id = self.next_packet_id;
        self.next_packet_id = self.next_packet_id.checked_add(1).unwrap_or(1);
        let packet = Packet::Subscribe(Subscribe {
            packet_id,
            filter: filter.to_owned(),
        });
        let bytes = packet.encode()?;
        self.last_tx = now;
        debug!("SUBSCRIBE framed for {} (packet id {})", filter, packet_id);
        Ok(bytes)
    }

    /// Ends the session. Returns the DISCONNECT bytes while a session
    /// exists; calling again on a dead session is a no-op.
    pub fn disconnect(&mut self) -> Option<Bytes> {
        match self.state {
            ConnectionState::Connecting | ConnectionState::Connected => {
                self.mark_disconnected();
                // An empty packet cannot fail to encode.
                Packet::Disconnect.encode().ok()
            }
            ConnectionState::Disconnected => None,
        }
    }
}
