//! MQTT 3.1.1 control packet codec for the QoS 0 client subset.
//!
//! Framing: one header byte (packet type in the high nibble, flags in the
//! low nibble), a remaining-length field (1-4 bytes, 7 value bits per byte,
//! high bit marks continuation), then the body. Strings carry a 16-bit
//! big-endian length prefix and must be UTF-8.
//!
//! Decoding is incremental: [`Packet::decode`] reads from the front of a
//! receive buffer and reports [`Decoded::NeedMore`] until a full packet is
//! buffered, so the caller can feed it partial TCP reads without extra
//! framing state. Anything that cannot become valid by buffering more bytes
//! is a [`WireError`].
//!
//! The codec covers both directions for every supported type so the same
//! code can frame the client side and a broker stand-in under test.

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;

pub const PROTOCOL_NAME: &str = "MQTT";
pub const PROTOCOL_LEVEL: u8 = 4;

/// Largest value the remaining-length field can carry (0x0FFFFFFF).
pub const MAX_REMAINING_LENGTH: usize = 268_435_455;

const CONNECT_FLAG_CLEAN_SESSION: u8 = 0x02;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    #[error("packet type {0} is not part of the QoS 0 session set")]
    UnsupportedPacketType(u8),

    #[error("fixed header flags {flags:#06b} are invalid for {kind:?}")]
    InvalidHeaderFlags { kind: PacketType, flags: u8 },

    #[error("remaining length field uses more than 4 bytes")]
    InvalidRemainingLength,

    #[error("remaining length {0} exceeds the protocol maximum")]
    PacketTooLarge(usize),

    #[error("a length field points past the end of the packet body")]
    TruncatedField,

    #[error("string field contains invalid UTF-8")]
    InvalidUtf8,

    #[error("publish QoS {0} is not supported by this client")]
    UnsupportedQos(u8),

    #[error("connect flags {0:#010b} are not valid for a clean QoS 0 session")]
    InvalidConnectFlags(u8),

    #[error("packet identifier must be non-zero")]
    ZeroPacketId,

    #[error("topic must not be empty")]
    EmptyTopic,

    #[error("string length {0} exceeds the 16-bit field limit")]
    StringTooLong(usize),

    #[error("protocol name or level is not MQTT 3.1.1")]
    InvalidProtocol,

    #[error("{0:?} carries more body bytes than its layout allows")]
    UnexpectedBody(PacketType),
}

/// Control packet types this client speaks, tagged with their wire values.
#[repr(u8)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum PacketType {
    Connect = 1,
    ConnAck = 2,
    Publish = 3,
    Subscribe = 8,
    SubAck = 9,
    PingReq = 12,
    PingResp = 13,
    Disconnect = 14,
}

impl PacketType {
    /// Flag nibble MQTT 3.1.1 mandates for non-PUBLISH types.
    pub const fn fixed_flags(self) -> u8 {
        match self {
            PacketType::Subscribe => 0b0010,
            _ => 0b0000,
        }
    }

    pub const fn header_byte(self) -> u8 {
        ((self as u8) << 4) | self.fixed_flags()
    }

    pub const fn from_header(byte: u8) -> Option<Self> {
        match byte >> 4 {
            1 => Some(PacketType::Connect),
            2 => Some(PacketType::ConnAck),
            3 => Some(PacketType::Publish),
            8 => Some(PacketType::Subscribe),
            9 => Some(PacketType::SubAck),
            12 => Some(PacketType::PingReq),
            13 => Some(PacketType::PingResp),
            14 => Some(PacketType::Disconnect),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connect {
    pub client_id: String,
    pub keepalive_secs: u16,
    pub clean_session: bool,
}

impl Connect {
    fn read(body: &[u8]) -> Result<Self, WireError> {
        let mut offset = 0;
        let protocol = read_string(body, &mut offset)?;
        let level = read_u8(body, &mut offset)?;
        if protocol != PROTOCOL_NAME || level != PROTOCOL_LEVEL {
            return Err(WireError::InvalidProtocol);
        }
        let flags = read_u8(body, &mut offset)?;
        if flags & !CONNECT_FLAG_CLEAN_SESSION != 0 {
            return Err(WireError::InvalidConnectFlags(flags));
        }
        let clean_session = flags & CONNECT_FLAG_CLEAN_SESSION != 0;
        let keepalive_secs = read_u16(body, &mut offset)?;
        let client_id = read_string(body, &mut offset)?;
        expect_consumed(body, offset, PacketType::Connect)?;
        Ok(Self {
            client_id,
            keepalive_secs,
            clean_session,
        })
    }

    fn write_body(&self, buf: &mut BytesMut) -> Result<(), WireError> {
        write_string(buf, PROTOCOL_NAME)?;
        buf.put_u8(PROTOCOL_LEVEL);
        buf.put_u8(if self.clean_session {
            CONNECT_FLAG_CLEAN_SESSION
        } else {
            0
        });
        buf.put_u16(self.keepalive_secs);
        write_string(buf, &self.client_id)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnAck {
    pub session_present: bool,
    pub return_code: u8,
}

impl ConnAck {
    pub const ACCEPTED: u8 = 0;
    pub const UNACCEPTABLE_PROTOCOL_VERSION: u8 = 1;
    pub const IDENTIFIER_REJECTED: u8 = 2;
    pub const SERVER_UNAVAILABLE: u8 = 3;
    pub const BAD_CREDENTIALS: u8 = 4;
    pub const NOT_AUTHORIZED: u8 = 5;

    /// Human-readable meaning of a CONNACK return code, for log lines.
    pub fn reason(code: u8) -> &'static str {
        match code {
            Self::ACCEPTED => "connection accepted",
            Self::UNACCEPTABLE_PROTOCOL_VERSION => "unacceptable protocol version",
            Self::IDENTIFIER_REJECTED => "client identifier rejected",
            Self::SERVER_UNAVAILABLE => "server unavailable",
            Self::BAD_CREDENTIALS => "bad user name or password",
            Self::NOT_AUTHORIZED => "not authorized",
            _ => "unknown return code",
        }
    }

    fn read(body: &[u8]) -> Result<Self, WireError> {
        let mut offset = 0;
        let ack_flags = read_u8(body, &mut offset)?;
        let return_code = read_u8(body, &mut offset)?;
        expect_consumed(body, offset, PacketType::ConnAck)?;
        Ok(Self {
            session_present: ack_flags & 0x01 != 0,
            return_code,
        })
    }

    fn write_body(&self, buf: &mut BytesMut) {
        buf.put_u8(self.session_present as u8);
        buf.put_u8(self.return_code);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Publish {
    pub topic: String,
    pub payload: Bytes,
    /// Set on inbound delivery of a retained message; always false outbound.
    pub retain: bool,
}

impl Publish {
    fn read(body: &[u8], flags: u8) -> Result<Self, WireError> {
        let qos = (flags >> 1) & 0b11;
        if qos != 0 {
            return Err(WireError::UnsupportedQos(qos));
        }
        // With QoS 0 the DUP bit must stay clear.
        if flags & 0b1000 != 0 {
            return Err(WireError::InvalidHeaderFlags {
                kind: PacketType::Publish,
                flags,
            });
        }
        let mut offset = 0;
        let topic = read_string(body, &mut offset)?;
        if topic.is_empty() {
            return Err(WireError::EmptyTopic);
        }
        let payload = Bytes::copy_from_slice(&body[offset..]);
        Ok(Self {
            topic,
            payload,
            retain: flags & 0b0001 != 0,
        })
    }

    fn write_body(&self, buf: &mut BytesMut) -> Result<(), WireError> {
        if self.topic.is_empty() {
            return Err(WireError::EmptyTopic);
        }
        write_string(buf, &self.topic)?;
        buf.put_slice(&self.payload);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscribe {
    pub packet_id: u16,
    pub filter: String,
}

impl Subscribe {
    fn read(body: &[u8]) -> Result<Self, WireError> {
        let mut offset = 0;
        let packet_id = read_u16(body, &mut offset)?;
        if packet_id == 0 {
            return Err(WireError::ZeroPacketId);
        }
        let filter = read_string(body, &mut offset)?;
        if filter.is_empty() {
            return Err(WireError::EmptyTopic);
        }
        let requested_qos = read_u8(body, &mut offset)?;
        if requested_qos != 0 {
            return Err(WireError::UnsupportedQos(requested_qos));
        }
        // Single-filter subset: one filter per SUBSCRIBE.
        expect_consumed(body, offset, PacketType::Subscribe)?;
        Ok(Self { packet_id, filter })
    }

    fn write_body(&self, buf: &mut BytesMut) -> Result<(), WireError> {
        buf.put_u16(self.packet_id);
        write_string(buf, &self.filter)?;
        buf.put_u8(0);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubAck {
    pub packet_id: u16,
    pub return_code: u8,
}

impl SubAck {
    /// Broker refused the subscription.
    pub const FAILURE: u8 = 0x80;

    fn read(body: &[u8]) -> Result<Self, WireError> {
        let mut offset = 0;
        let packet_id = read_u16(body, &mut offset)?;
        let return_code = read_u8(body, &mut offset)?;
        expect_consumed(body, offset, PacketType::SubAck)?;
        Ok(Self {
            packet_id,
            return_code,
        })
    }

    fn write_body(&self, buf: &mut BytesMut) {
        buf.put_u16(self.packet_id);
        buf.put_u8(self.return_code);
    }
}

/// One MQTT control packet, decoded or ready to encode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Connect(Connect),
    ConnAck(ConnAck),
    Publish(Publish),
    Subscribe(Subscribe),
    SubAck(SubAck),
    PingReq,
    PingResp,
    Disconnect,
}

/// Outcome of one decode attempt against the front of a buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// A complete packet and the total bytes it occupied on the wire.
    Packet(Packet, usize),
    /// The buffer ends before the packet does; read more and retry.
    NeedMore,
}

impl Packet {
    pub fn packet_type(&self) -> PacketType {
        match self {
            Packet::Connect(_) => PacketType::Connect,
            Packet::ConnAck(_) => PacketType::ConnAck,
            Packet::Publish(_) => PacketType::Publish,
            Packet::Subscribe(_) => PacketType::Subscribe,
            Packet::SubAck(_) => PacketType::SubAck,
            Packet::PingReq => PacketType::PingReq,
            Packet::PingResp => PacketType::PingResp,
            Packet::Disconnect => PacketType::Disconnect,
        }
    }

    fn header_byte(&self) -> u8 {
        match self {
            Packet::Publish(p) => {
                PacketType::Publish.header_byte() | if p.retain { 0b0001 } else { 0 }
            }
            other => other.packet_type().header_byte(),
        }
    }

    /// Frames the packet as wire bytes (header, remaining length, body).
    pub fn encode(&self) -> Result<Bytes, WireError> {
        let mut body = BytesMut::new();
        match self {
            Packet::Connect(c) => c.write_body(&mut body)?,
            Packet::ConnAck(c) => c.write_body(&mut body),
            Packet::Publish(p) => p.write_body(&mut body)?,
            Packet::Subscribe(s) => s.write_body(&mut body)?,
            Packet::SubAck(s) => s.write_body(&mut body),
            Packet::PingReq | Packet::PingResp | Packet::Disconnect => {}
        }

        let mut out = BytesMut::with_capacity(body.len() + 5);
        out.put_u8(self.header_byte());
        write_remaining_length(&mut out, body.len())?;
        out.extend_from_slice(&body);
        Ok(out.freeze())
    }

    /// Tries to decode one packet from the front of `buf`.
    ///
    /// Returns the packet together with the byte count consumed so the
    /// caller can advance its buffer; `NeedMore` means the framing is fine
    /// so far but incomplete.
    pub fn decode(buf: &[u8]) -> Result<Decoded, WireError> {
        if buf.is_empty() {
            return Ok(Decoded::NeedMore);
        }
        let header = buf[0];
        let kind = PacketType::from_header(header)
            .ok_or(WireError::UnsupportedPacketType(header >> 4))?;
        let (body_len, len_width) = match read_remaining_length(&buf[1..])? {
            Some(parsed) => parsed,
            None => return Ok(Decoded::NeedMore),
        };
        let total = 1 + len_width + body_len;
        if buf.len() < total {
            return Ok(Decoded::NeedMore);
        }

        let flags = header & 0x0F;
        if kind != PacketType::Publish && flags != kind.fixed_flags() {
            return Err(WireError::InvalidHeaderFlags { kind, flags });
        }

        let body = &buf[1 + len_width..total];
        let packet = match kind {
            PacketType::Connect => Packet::Connect(Connect::read(body)?),
            PacketType::ConnAck => Packet::ConnAck(ConnAck::read(body)?),
            PacketType::Publish => Packet::Publish(Publish::read(body, flags)?),
            PacketType::Subscribe => Packet::Subscribe(Subscribe::read(body)?),
            PacketType::SubAck => Packet::SubAck(SubAck::read(body)?),
            PacketType::PingReq => {
                expect_consumed(body, 0, PacketType::PingReq)?;
                Packet::PingReq
            }
            PacketType::PingResp => {
                expect_consumed(body, 0, PacketType::PingResp)?;
                Packet::PingResp
            }
            PacketType::Disconnect => {
                expect_consumed(body, 0, PacketType::Disconnect)?;
                Packet::Disconnect
            }
        };
        Ok(Decoded::Packet(packet, total))
    }
}

/// Reads the remaining-length varint. `None` means the buffer ended inside
/// the field; an encoding past 4 bytes can never become valid and errors.
fn read_remaining_length(bytes: &[u8]) -> Result<Option<(usize, usize)>, WireError> {
    let mut value = 0usize;
    let mut shift = 0u32;
    for (i, &byte) in bytes.iter().enumerate() {
        if i == 4 {
            return Err(WireError::InvalidRemainingLength);
        }
        value |= ((byte & 0x7F) as usize) << shift;
        shift += 7;
        if byte & 0x80 == 0 {
            return Ok(Some((value, i + 1)));
        }
    }
    if bytes.len() >= 4 {
        return Err(WireError::InvalidRemainingLength);
    }
    Ok(None)
}

fn write_remaining_length(buf: &mut BytesMut, value: usize) -> Result<usize, WireError> {
    if value > MAX_REMAINING_LENGTH {
        return Err(WireError::PacketTooLarge(value));
    }
    let mut rest = value;
    let mut written = 0;
    loop {
        let mut byte = (rest % 128) as u8;
        rest /= 128;
        if rest > 0 {
            byte |= 0x80;
        }
        buf.put_u8(byte);
        written += 1;
        if rest == 0 {
            break;
        }
    }
    Ok(written)
}

fn read_u8(body: &[u8], offset: &mut usize) -> Result<u8, WireError> {
    if *offset >= body.len() {
        return Err(WireError::TruncatedField);
    }
    let value = body[*offset];
    *offset += 1;
    Ok(value)
}

fn read_u16(body: &[u8], offset: &mut usize) -> Result<u16, WireError> {
    if *offset + 2 > body.len() {
        return Err(WireError::TruncatedField);
    }
    let value = u16::from_be_bytes([body[*offset], body[*offset + 1]]);
    *offset += 2;
    Ok(value)
}

fn read_string(body: &[u8], offset: &mut usize) -> Result<String, WireError> {
    let len = read_u16(body, offset)? as usize;
    if *offset + len > body.len() {
        return Err(WireError::TruncatedField);
    }
    let text = std::str::from_utf8(&body[*offset..*offset + len])
        .map_err(|_| WireError::InvalidUtf8)?;
    *offset += len;
    Ok(text.to_owned())
}

fn write_string(buf: &mut BytesMut, text: &str) -> Result<(), WireError> {
    if text.len() > u16::MAX as usize {
        return Err(WireError::StringTooLong(text.len()));
    }
    buf.put_u16(text.len() as u16);
    buf.put_slice(text.as_bytes());
    Ok(())
}

fn expect_consumed(body: &[u8], offset: usize, kind: PacketType) -> Result<(), WireError> {
    if offset != body.len() {
        return Err(WireError::UnexpectedBody(kind));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(packet: Packet) {
        let wire = packet.encode().unwrap();
        match Packet::decode(&wire).unwrap() {
            Decoded::Packet(decoded, consumed) => {
                assert_eq!(decoded, packet);
                assert_eq!(consumed, wire.len());
            }
            Decoded::NeedMore => panic!("complete packet reported as incomplete"),
        }
    }

    #[test]
    fn connect_round_trip() {
        round_trip(Packet::Connect(Connect {
            client_id: "softphone-1".into(),
            keepalive_secs: 60,
            clean_session: true,
        }));
    }

    #[test]
    fn connack_round_trip() {
        round_trip(Packet::ConnAck(ConnAck {
            session_present: false,
            return_code: ConnAck::ACCEPTED,
        }));
        round_trip(Packet::ConnAck(ConnAck {
            session_present: true,
            return_code: ConnAck::NOT_AUTHORIZED,
        }));
    }

    #[test]
    fn publish_round_trip() {
        round_trip(Packet::Publish(Publish {
            topic: "phone/events".into(),
            payload: Bytes::from_static(b"ready"),
            retain: false,
        }));
        round_trip(Packet::Publish(Publish {
            topic: "phone/events".into(),
            payload: Bytes::new(),
            retain: true,
        }));
    }

    #[test]
    fn subscribe_round_trip() {
        round_trip(Packet::Subscribe(Subscribe {
            packet_id: 1,
            filter: "phone/#".into(),
        }));
    }

    #[test]
    fn suback_round_trip() {
        round_trip(Packet::SubAck(SubAck {
            packet_id: 1,
            return_code: 0,
        }));
        round_trip(Packet::SubAck(SubAck {
            packet_id: 7,
            return_code: SubAck::FAILURE,
        }));
    }

    #[test]
    fn bodyless_round_trips() {
        round_trip(Packet::PingReq);
        round_trip(Packet::PingResp);
        round_trip(Packet::Disconnect);
    }

    #[test]
    fn remaining_length_minimal_widths() {
        let cases: [(usize, usize); 6] = [
            (0, 1),
            (127, 1),
            (128, 2),
            (16_383, 2),
            (16_384, 3),
            (2_097_151, 3),
        ];
        for (value, expected_width) in cases {
            let mut buf = BytesMut::new();
            let written = write_remaining_length(&mut buf, value).unwrap();
            assert_eq!(written, expected_width, "width for {value}");
            let (parsed, width) = read_remaining_length(&buf).unwrap().unwrap();
            assert_eq!(parsed, value);
            assert_eq!(width, expected_width);
        }
    }

    #[test]
    fn remaining_length_maximum() {
        let mut buf = BytesMut::new();
        assert_eq!(
            write_remaining_length(&mut buf, MAX_REMAINING_LENGTH).unwrap(),
            4
        );
        assert_eq!(
            read_remaining_length(&buf).unwrap(),
            Some((MAX_REMAINING_LENGTH, 4))
        );
    }

    #[test]
    fn remaining_length_rejects_oversize_encode() {
        let mut buf = BytesMut::new();
        assert_eq!(
            write_remaining_length(&mut buf, MAX_REMAINING_LENGTH + 1),
            Err(WireError::PacketTooLarge(MAX_REMAINING_LENGTH + 1))
        );
    }

    #[test]
    fn remaining_length_rejects_five_byte_field() {
        assert_eq!(
            read_remaining_length(&[0x80, 0x80, 0x80, 0x80, 0x01]),
            Err(WireError::InvalidRemainingLength)
        );
        assert_eq!(
            read_remaining_length(&[0x80, 0x80, 0x80, 0x80]),
            Err(WireError::InvalidRemainingLength)
        );
    }

    #[test]
    fn truncated_varint_asks_for_more() {
        assert_eq!(read_remaining_length(&[0x80]).unwrap(), None);
        assert_eq!(read_remaining_length(&[]).unwrap(), None);
    }

    #[test]
    fn decode_requests_more_for_partial_packets() {
        let wire = Packet::Publish(Publish {
            topic: "phone/events".into(),
            payload: Bytes::from_static(b"call established"),
            retain: false,
        })
        .encode()
        .unwrap();

        assert_eq!(Packet::decode(&[]).unwrap(), Decoded::NeedMore);
        for cut in 1..wire.len() {
            assert_eq!(
                Packet::decode(&wire[..cut]).unwrap(),
                Decoded::NeedMore,
                "prefix of {cut} bytes"
            );
        }
    }

    #[test]
    fn decode_leaves_following_packet_untouched() {
        let first = Packet::PingResp.encode().unwrap();
        let second = Packet::Publish(Publish {
            topic: "phone/events".into(),
            payload: Bytes::from_static(b"x"),
            retain: false,
        })
        .encode()
        .unwrap();

        let mut stream = BytesMut::new();
        stream.extend_from_slice(&first);
        stream.extend_from_slice(&second);

        match Packet::decode(&stream).unwrap() {
            Decoded::Packet(packet, consumed) => {
                assert_eq!(packet, Packet::PingResp);
                assert_eq!(consumed, first.len());
                match Packet::decode(&stream[consumed..]).unwrap() {
                    Decoded::Packet(next, next_consumed) => {
                        assert_eq!(next.packet_type(), PacketType::Publish);
                        assert_eq!(next_consumed, second.len());
                    }
                    Decoded::NeedMore => panic!("second packet incomplete"),
                }
            }
            Decoded::NeedMore => panic!("first packet incomplete"),
        }
    }

    #[test]
    fn decode_rejects_unsupported_packet_type() {
        // PUBACK (type 4) never appears in a QoS 0 session.
        assert_eq!(
            Packet::decode(&[0x40, 0x02, 0x00, 0x01]),
            Err(WireError::UnsupportedPacketType(4))
        );
    }

    #[test]
    fn decode_rejects_nonzero_publish_qos() {
        // PUBLISH with QoS 1 flag bit set.
        let body = [0x00, 0x01, b'a', 0x00, 0x01];
        let mut wire = vec![0x32, body.len() as u8];
        wire.extend_from_slice(&body);
        assert_eq!(Packet::decode(&wire), Err(WireError::UnsupportedQos(1)));
    }

    #[test]
    fn decode_rejects_bad_subscribe_flags() {
        // SUBSCRIBE must carry flag nibble 0b0010.
        assert_eq!(
            Packet::decode(&[0x80, 0x00]),
            Err(WireError::InvalidHeaderFlags {
                kind: PacketType::Subscribe,
                flags: 0,
            })
        );
    }

    #[test]
    fn decode_rejects_string_overrun() {
        // PUBLISH whose topic length claims more bytes than the body holds.
        let wire = [0x30, 0x03, 0x00, 0x09, b'a'];
        assert_eq!(Packet::decode(&wire), Err(WireError::TruncatedField));
    }

    #[test]
    fn decode_rejects_invalid_utf8_topic() {
        let wire = [0x30, 0x04, 0x00, 0x02, 0xFF, 0xFE];
        assert_eq!(Packet::decode(&wire), Err(WireError::InvalidUtf8));
    }

    #[test]
    fn decode_rejects_body_on_ping() {
        let wire = [0xC0, 0x01, 0x00];
        assert_eq!(
            Packet::decode(&wire),
            Err(WireError::UnexpectedBody(PacketType::PingReq))
        );
    }

    #[test]
    fn encode_rejects_empty_publish_topic() {
        let packet = Packet::Publish(Publish {
            topic: String::new(),
            payload: Bytes::from_static(b"x"),
            retain: false,
        });
        assert_eq!(packet.encode(), Err(WireError::EmptyTopic));
    }

    #[test]
    fn encode_rejects_oversized_topic() {
        let packet = Packet::Publish(Publish {
            topic: "t".repeat(u16::MAX as usize + 1),
            payload: Bytes::new(),
            retain: false,
        });
        assert!(matches!(packet.encode(), Err(WireError::StringTooLong(_))));
    }
}
