use std::{error::Error, fmt};

use bytes::{Buf, Bytes};

use crate::{frame::Frame, protocol::packet_type::PacketType};

pub mod ack_packets;
pub mod conn_ack_packet;
pub mod connect_packet;
pub mod disconnect_packet;
pub mod ping_req_packet;
pub mod ping_resp_packet;
pub mod publish_packet;
pub mod sub_ack_packet;
pub mod subscribe_packet;
pub mod unsubscribe_packet;

use ack_packets::{PubAckPacket, PubCompPacket, PubRecPacket, PubRelPacket, UnsubAckPacket};
use conn_ack_packet::ConnAckPacket;
use connect_packet::ConnectPacket;
use disconnect_packet::DisconnectPacket;
use ping_req_packet::PingReqPacket;
use ping_resp_packet::PingRespPacket;
use publish_packet::PublishPacket;
use sub_ack_packet::SubAckPacket;
use subscribe_packet::SubscribePacket;
use unsubscribe_packet::UnsubscribePacket;

pub trait DecodablePacket: Sized {
    fn packet_type() -> PacketType;

    /// Flags the fixed header must carry, `None` when decoding is lenient about them.
    fn reserved_flags() -> Option<u8> {
        None
    }

    /// Checks the control byte before the payload is interpreted.
    fn validate_header(control: u8) -> Result<(), PacketError> {
        let packet_type = control >> 4;
        if packet_type != Self::packet_type().to_u8() {
            return Err(PacketError::ProtocolError(Some(format!(
                "Invalid packet type: {packet_type}, expected {}",
                Self::packet_type()
            ))));
        }

        match Self::reserved_flags() {
            Some(expected) => validate_flags(control, expected),
            None => Ok(()),
        }
    }

    fn decode_payload(control: u8, payload: Bytes) -> Result<Self, PacketError>;

    fn decode(frame: &Frame) -> Result<Self, PacketError> {
        Self::validate_header(frame.control)?;
        Self::decode_payload(frame.control, frame.payload.clone())
    }
}

pub trait EncodablePacket {
    fn encode(&self) -> Result<Frame, PacketError>;
}

/// Checks the reserved flags (4 LSB) of the fixed header.
fn validate_flags(control: u8, expected: u8) -> Result<(), PacketError> {
    let flags = control & 0x0F;
    if flags != expected {
        return Err(PacketError::MalformedPacket(Some(format!(
            "Fixed header flags are reserved: expected {expected:#06b}, got {flags:#06b}"
        ))));
    }

    Ok(())
}

/// Fails if a fixed-size packet carries trailing bytes.
pub(crate) fn ensure_consumed(buf: &Bytes, packet_type: PacketType) -> Result<(), PacketError> {
    if buf.has_remaining() {
        return Err(PacketError::MalformedPacket(Some(format!(
            "{packet_type} has {} unexpected trailing bytes",
            buf.remaining()
        ))));
    }

    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PacketError {
    PacketTooLarge(Option<String>),
    MalformedPacket(Option<String>),
    ProtocolError(Option<String>),
    UnsupportedPacketType(u8),
}

impl fmt::Display for PacketError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PacketTooLarge(Some(reason)) => write!(f, "Packet Too Large: {reason}"),
            Self::PacketTooLarge(None) => write!(f, "Packet Too Large"),

            Self::MalformedPacket(Some(reason)) => write!(f, "Malformed Packet: {reason}"),
            Self::MalformedPacket(None) => write!(f, "Malformed Packet"),

            Self::ProtocolError(Some(reason)) => write!(f, "Protocol Error: {reason}"),
            Self::ProtocolError(None) => write!(f, "Protocol Error"),

            Self::UnsupportedPacketType(packet_type) => {
                write!(f, "Unsupported packet type [{packet_type}]")
            }
        }
    }
}

impl Error for PacketError {}

/// Every MQTT 3.1.1 control packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Connect(ConnectPacket),
    ConnAck(ConnAckPacket),
    Publish(PublishPacket),
    PubAck(PubAckPacket),
    PubRec(PubRecPacket),
    PubRel(PubRelPacket),
    PubComp(PubCompPacket),
    Subscribe(SubscribePacket),
    SubAck(SubAckPacket),
    Unsubscribe(UnsubscribePacket),
    UnsubAck(UnsubAckPacket),
    PingReq(PingReqPacket),
    PingResp(PingRespPacket),
    Disconnect(DisconnectPacket),
}

impl Packet {
    pub fn packet_type(&self) -> PacketType {
        match self {
            Self::Connect(_) => PacketType::Connect,
            Self::ConnAck(_) => PacketType::ConnAck,
            Self::Publish(_) => PacketType::Publish,
            Self::PubAck(_) => PacketType::PubAck,
            Self::PubRec(_) => PacketType::PubRec,
            Self::PubRel(_) => PacketType::PubRel,
            Self::PubComp(_) => PacketType::PubComp,
            Self::Subscribe(_) => PacketType::Subscribe,
            Self::SubAck(_) => PacketType::SubAck,
            Self::Unsubscribe(_) => PacketType::Unsubscribe,
            Self::UnsubAck(_) => PacketType::UnsubAck,
            Self::PingReq(_) => PacketType::PingReq,
            Self::PingResp(_) => PacketType::PingResp,
            Self::Disconnect(_) => PacketType::Disconnect,
        }
    }

    /// The packet identifier, for packets that carry one.
    pub fn packet_id(&self) -> Option<u16> {
        match self {
            Self::Publish(packet) => packet.packet_id,
            Self::PubAck(packet) => Some(packet.packet_id),
            Self::PubRec(packet) => Some(packet.packet_id),
            Self::PubRel(packet) => Some(packet.packet_id),
            Self::PubComp(packet) => Some(packet.packet_id),
            Self::Subscribe(packet) => Some(packet.packet_id),
            Self::SubAck(packet) => Some(packet.packet_id),
            Self::Unsubscribe(packet) => Some(packet.packet_id),
            Self::UnsubAck(packet) => Some(packet.packet_id),
            Self::Connect(_)
            | Self::ConnAck(_)
            | Self::PingReq(_)
            | Self::PingResp(_)
            | Self::Disconnect(_) => None,
        }
    }

    /// Whether this packet is of `packet_type` and, when given, carries `packet_id`.
    pub fn is(&self, packet_type: PacketType, packet_id: Option<u16>) -> bool {
        if self.packet_type() != packet_type {
            return false;
        }

        match packet_id {
            Some(packet_id) => self.packet_id() == Some(packet_id),
            None => true,
        }
    }

    pub fn encode(&self) -> Result<Frame, PacketError> {
        match self {
            Self::Connect(packet) => packet.encode(),
            Self::ConnAck(packet) => packet.encode(),
            Self::Publish(packet) => packet.encode(),
            Self::PubAck(packet) => packet.encode(),
            Self::PubRec(packet) => packet.encode(),
            Self::PubRel(packet) => packet.encode(),
            Self::PubComp(packet) => packet.encode(),
            Self::Subscribe(packet) => packet.encode(),
            Self::SubAck(packet) => packet.encode(),
            Self::Unsubscribe(packet) => packet.encode(),
            Self::UnsubAck(packet) => packet.encode(),
            Self::PingReq(packet) => packet.encode(),
            Self::PingResp(packet) => packet.encode(),
            Self::Disconnect(packet) => packet.encode(),
        }
    }

    /// Decodes a frame, dispatching on the type nibble of its control byte.
    ///
    /// # Errors
    /// - Returns `PacketError::UnsupportedPacketType` for type 0 and 15.
    /// - Returns the decode error of the packet type otherwise.
    pub fn decode(frame: &Frame) -> Result<Self, PacketError> {
        let Some(packet_type) = frame.packet_type() else {
            return Err(PacketError::UnsupportedPacketType(frame.type_nibble()));
        };

        let packet = match packet_type {
            PacketType::Connect => Self::Connect(ConnectPacket::decode(frame)?),
            PacketType::ConnAck => Self::ConnAck(ConnAckPacket::decode(frame)?),
            PacketType::Publish => Self::Publish(PublishPacket::decode(frame)?),
            PacketType::PubAck => Self::PubAck(PubAckPacket::decode(frame)?),
            PacketType::PubRec => Self::PubRec(PubRecPacket::decode(frame)?),
            PacketType::PubRel => Self::PubRel(PubRelPacket::decode(frame)?),
            PacketType::PubComp => Self::PubComp(PubCompPacket::decode(frame)?),
            PacketType::Subscribe => Self::Subscribe(SubscribePacket::decode(frame)?),
            PacketType::SubAck => Self::SubAck(SubAckPacket::decode(frame)?),
            PacketType::Unsubscribe => Self::Unsubscribe(UnsubscribePacket::decode(frame)?),
            PacketType::UnsubAck => Self::UnsubAck(UnsubAckPacket::decode(frame)?),
            PacketType::PingReq => Self::PingReq(PingReqPacket::decode(frame)?),
            PacketType::PingResp => Self::PingResp(PingRespPacket::decode(frame)?),
            PacketType::Disconnect => Self::Disconnect(DisconnectPacket::decode(frame)?),
        };

        Ok(packet)
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connect(packet) => write!(
                f,
                "[CONNECT] clientId: {}, username: {}, cleanSession: {}, will: {}, keepAlive: {}",
                packet.client_id,
                packet.username.as_deref().unwrap_or_default(),
                packet.clean_session,
                packet.will.as_ref().map(|will| will.topic.as_str()).unwrap_or_default(),
                packet.keep_alive,
            ),
            Self::ConnAck(packet) => write!(
                f,
                "[CONNACK] retCode: {}, sessPresent: {}",
                packet.return_code, packet.session_present
            ),
            Self::Publish(packet) => write!(
                f,
                "[PUBLISH] packetId: {}, topic: {}, payload: {} bytes, qos: {}, dup: {}, retain: {}",
                packet.packet_id.unwrap_or_default(),
                packet.topic,
                packet.payload.len(),
                packet.qos,
                packet.dup,
                packet.retain,
            ),
            Self::PubAck(packet) => write!(f, "[PUBACK] packetId: {}", packet.packet_id),
            Self::PubRec(packet) => write!(f, "[PUBREC] packetId: {}", packet.packet_id),
            Self::PubRel(packet) => write!(f, "[PUBREL] packetId: {}", packet.packet_id),
            Self::PubComp(packet) => write!(f, "[PUBCOMP] packetId: {}", packet.packet_id),
            Self::Subscribe(packet) => {
                write!(f, "[SUBSCRIBE] packetId: {}, topics: ", packet.packet_id)?;
                for (index, topic) in packet.topics.iter().enumerate() {
                    if index > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "[{}][{}]", topic.filter, topic.qos)?;
                }
                Ok(())
            }
            Self::SubAck(packet) => {
                let codes: Vec<String> =
                    packet.return_codes.iter().map(|code| code.to_string()).collect();
                write!(f, "[SUBACK] packetId: {}, retCodes: {}", packet.packet_id, codes.join(","))
            }
            Self::Unsubscribe(packet) => write!(
                f,
                "[UNSUBSCRIBE] packetId: {}, topics: {}",
                packet.packet_id,
                packet.topics.join(",")
            ),
            Self::UnsubAck(packet) => write!(f, "[UNSUBACK] packetId: {}", packet.packet_id),
            Self::PingReq(_) => write!(f, "[PINGREQ]"),
            Self::PingResp(_) => write!(f, "[PINGRESP]"),
            Self::Disconnect(_) => write!(f, "[DISCONNECT]"),
        }
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::packets::{connect_packet::Will, subscribe_packet::SubscribeTopic};
    use crate::protocol::qos::QoS;

    fn round_trip(packet: Packet) {
        let frame = packet.encode().unwrap();
        let bytes = frame.serialize();
        let (parsed, consumed) = Frame::parse(&bytes).unwrap().unwrap();

        assert_eq!(consumed, bytes.len());
        assert_eq!(Packet::decode(&parsed).unwrap(), packet, "{packet}");
    }

    #[test]
    fn every_packet_type_round_trips() {
        let packets = vec![
            Packet::Connect(ConnectPacket {
                client_id: "client-1".into(),
                clean_session: true,
                keep_alive: 60,
                will: Some(Will {
                    topic: "status/client-1".into(),
                    message: Bytes::from_static(b"offline"),
                    qos: QoS::AtLeastOnce,
                    retain: true,
                }),
                username: Some("user".into()),
                password: Some(Bytes::from_static(b"pass")),
                ..ConnectPacket::default()
            }),
            Packet::ConnAck(ConnAckPacket { session_present: true, return_code: 0 }),
            Packet::Publish(PublishPacket::new("a/b", "qos0", QoS::AtMostOnce)),
            Packet::Publish(PublishPacket {
                packet_id: Some(10),
                ..PublishPacket::new("a/b", "qos1", QoS::AtLeastOnce)
            }),
            Packet::Publish(PublishPacket {
                packet_id: Some(65_535),
                dup: true,
                retain: true,
                ..PublishPacket::new("a/b", Bytes::new(), QoS::ExactlyOnce)
            }),
            Packet::PubAck(PubAckPacket::new(1)),
            Packet::PubRec(PubRecPacket::new(2)),
            Packet::PubRel(PubRelPacket::new(3)),
            Packet::PubComp(PubCompPacket::new(4)),
            Packet::Subscribe(SubscribePacket {
                packet_id: 5,
                topics: vec![SubscribeTopic::new("a/+", QoS::AtMostOnce)],
            }),
            Packet::Subscribe(SubscribePacket {
                packet_id: 6,
                topics: vec![
                    SubscribeTopic::new("a/#", QoS::AtLeastOnce),
                    SubscribeTopic::new("b", QoS::ExactlyOnce),
                    SubscribeTopic::new("c/+/d", QoS::AtMostOnce),
                ],
            }),
            Packet::SubAck(SubAckPacket { packet_id: 6, return_codes: vec![0x01, 0x80, 0x00] }),
            Packet::Unsubscribe(UnsubscribePacket { packet_id: 7, topics: vec!["a/+".into()] }),
            Packet::Unsubscribe(UnsubscribePacket {
                packet_id: 8,
                topics: vec!["a/#".into(), "b".into()],
            }),
            Packet::UnsubAck(UnsubAckPacket::new(8)),
            Packet::PingReq(PingReqPacket),
            Packet::PingResp(PingRespPacket),
            Packet::Disconnect(DisconnectPacket),
        ];

        for packet in packets {
            round_trip(packet);
        }
    }

    #[test]
    fn unsupported_type_nibble_is_rejected() {
        let frame = Frame::new(0xF0, Bytes::new()).unwrap();
        assert_eq!(Packet::decode(&frame), Err(PacketError::UnsupportedPacketType(15)));

        let frame = Frame::new(0x00, Bytes::new()).unwrap();
        assert_eq!(Packet::decode(&frame), Err(PacketError::UnsupportedPacketType(0)));
    }

    #[test]
    fn typed_decode_checks_type_nibble() {
        let frame = Packet::PubRec(PubRecPacket::new(9)).encode().unwrap();

        assert!(matches!(PubAckPacket::decode(&frame), Err(PacketError::ProtocolError(_))));
        assert_eq!(PubRecPacket::decode(&frame).unwrap(), PubRecPacket::new(9));
    }

    #[test]
    fn is_matches_type_and_packet_id() {
        let packet = Packet::PubAck(PubAckPacket::new(12));

        assert!(packet.is(PacketType::PubAck, None));
        assert!(packet.is(PacketType::PubAck, Some(12)));
        assert!(!packet.is(PacketType::PubAck, Some(13)));
        assert!(!packet.is(PacketType::PubComp, Some(12)));
        assert!(Packet::PingResp(PingRespPacket).is(PacketType::PingResp, None));
    }

    #[test]
    fn display_is_per_variant() {
        let packet = Packet::SubAck(SubAckPacket { packet_id: 3, return_codes: vec![0, 128] });
        assert_eq!(packet.to_string(), "[SUBACK] packetId: 3, retCodes: 0,128");
        assert_eq!(Packet::PingReq(PingReqPacket).to_string(), "[PINGREQ]");
    }
}
