use bytes::{BufMut, Bytes, BytesMut};

use crate::{
    frame::Frame,
    protocol::{
        decoding::{decode_u16, decode_utf8_string},
        encoding::write_utf8_string,
        packet_type::PacketType,
        qos::QoS,
        validation::{validate_packet_id, validate_topic_name},
    },
};

use super::{DecodablePacket, EncodablePacket, PacketError};

const DUP_FLAG: u8 = 0b0000_1000;
const RETAIN_FLAG: u8 = 0b0000_0001;

/// The PUBLISH control packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishPacket {
    pub topic: String,

    /// Application message, everything after the variable header.
    pub payload: Bytes,

    pub qos: QoS,
    pub dup: bool,
    pub retain: bool,

    /// Present if and only if `qos` is above `AtMostOnce`.
    pub packet_id: Option<u16>,
}

impl PublishPacket {
    pub fn new(topic: impl Into<String>, payload: impl Into<Bytes>, qos: QoS) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            qos,
            dup: false,
            retain: false,
            packet_id: None,
        }
    }

    fn control_byte(&self) -> u8 {
        let mut control = PacketType::Publish.control_byte() | self.qos.to_u8() << 1;

        if self.dup {
            control |= DUP_FLAG;
        }

        if self.retain {
            control |= RETAIN_FLAG;
        }

        control
    }
}

impl EncodablePacket for PublishPacket {
    /// # Errors
    /// - Returns `PacketError::ProtocolError` if the topic is invalid or a `QoS` > 0
    ///   publish has no packet identifier.
    fn encode(&self) -> Result<Frame, PacketError> {
        validate_topic_name(&self.topic)?;

        let mut buf = BytesMut::with_capacity(2 + self.topic.len() + 2 + self.payload.len());
        write_utf8_string(&mut buf, &self.topic)?;

        if self.qos > QoS::AtMostOnce {
            buf.put_u16(validate_packet_id(self.packet_id)?);
        }

        buf.put_slice(&self.payload);

        Frame::new(self.control_byte(), buf)
    }
}

impl DecodablePacket for PublishPacket {
    fn packet_type() -> PacketType {
        PacketType::Publish
    }

    fn decode_payload(control: u8, mut payload: Bytes) -> Result<Self, PacketError> {
        let qos = QoS::from_u8(control >> 1 & 0b0000_0011).ok_or_else(|| {
            PacketError::MalformedPacket(Some("Publish QoS must be 0, 1 or 2. Got: 3".into()))
        })?;

        let topic = decode_utf8_string(&mut payload)?;
        validate_topic_name(&topic)?;

        let packet_id = if qos > QoS::AtMostOnce {
            Some(validate_packet_id(Some(decode_u16(&mut payload)?))?)
        } else {
            None
        };

        Ok(Self {
            topic,
            payload,
            qos,
            dup: control & DUP_FLAG != 0,
            retain: control & RETAIN_FLAG != 0,
            packet_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_flags_carry_qos_dup_retain() {
        let packet = PublishPacket {
            dup: true,
            retain: true,
            packet_id: Some(1),
            ..PublishPacket::new("t", "x", QoS::ExactlyOnce)
        };

        let bytes = packet.encode().unwrap().serialize();
        assert_eq!(bytes[0], 0x3D);
        assert_eq!(&bytes[1..], &[0x06, 0x00, 0x01, b't', 0x00, 0x01, b'x']);
    }

    #[test]
    fn qos0_has_no_packet_id() {
        let bytes = PublishPacket::new("a/b", "hi", QoS::AtMostOnce).encode().unwrap().serialize();
        assert_eq!(&bytes[..], &[0x30, 0x07, 0x00, 0x03, b'a', b'/', b'b', b'h', b'i']);
    }

    #[test]
    fn encode_validates_topic_and_packet_id() {
        let empty_topic = PublishPacket::new("", "x", QoS::AtMostOnce);
        assert!(matches!(empty_topic.encode(), Err(PacketError::ProtocolError(_))));

        let missing_id = PublishPacket::new("t", "x", QoS::AtLeastOnce);
        assert!(matches!(missing_id.encode(), Err(PacketError::ProtocolError(_))));
    }

    #[test]
    fn qos3_is_malformed() {
        let frame = Frame::new(0x36, vec![0x00, 0x01, b't', 0x00, 0x01]).unwrap();
        assert!(matches!(PublishPacket::decode(&frame), Err(PacketError::MalformedPacket(_))));
    }

    #[test]
    fn payload_runs_to_end_of_frame() {
        let frame = Frame::new(0x32, vec![0x00, 0x01, b't', 0x00, 0x09, 1, 2, 3]).unwrap();
        let packet = PublishPacket::decode(&frame).unwrap();

        assert_eq!(packet.qos, QoS::AtLeastOnce);
        assert_eq!(packet.packet_id, Some(9));
        assert_eq!(&packet.payload[..], &[1, 2, 3]);
    }
}
