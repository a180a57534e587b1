use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::{
    frame::Frame,
    protocol::{
        decoding::{decode_u16, decode_utf8_string},
        encoding::write_utf8_string,
        packet_type::PacketType,
        validation::validate_packet_id,
    },
};

use super::{DecodablePacket, EncodablePacket, PacketError};

/// The UNSUBSCRIBE control packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsubscribePacket {
    pub packet_id: u16,
    pub topics: Vec<String>,
}

impl EncodablePacket for UnsubscribePacket {
    fn encode(&self) -> Result<Frame, PacketError> {
        if self.topics.is_empty() {
            return Err(PacketError::ProtocolError(Some(
                "Unsubscribe must contain at least one topic filter".into(),
            )));
        }

        let mut buf = BytesMut::new();
        buf.put_u16(validate_packet_id(Some(self.packet_id))?);

        for topic in &self.topics {
            write_utf8_string(&mut buf, topic)?;
        }

        Frame::new(PacketType::Unsubscribe.control_byte(), buf)
    }
}

impl DecodablePacket for UnsubscribePacket {
    fn packet_type() -> PacketType {
        PacketType::Unsubscribe
    }

    fn reserved_flags() -> Option<u8> {
        Some(0b0010)
    }

    fn decode_payload(_control: u8, mut payload: Bytes) -> Result<Self, PacketError> {
        let packet_id = decode_u16(&mut payload)?;

        let mut topics = Vec::new();
        while payload.has_remaining() {
            topics.push(decode_utf8_string(&mut payload)?);
        }

        if topics.is_empty() {
            return Err(PacketError::ProtocolError(Some(
                "Unsubscribe must contain at least one topic filter".into(),
            )));
        }

        Ok(Self { packet_id, topics })
    }
}
