use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::{
    frame::Frame,
    protocol::{
        decoding::{decode_u16, decode_u8, decode_utf8_string},
        encoding::write_utf8_string,
        packet_type::PacketType,
        qos::QoS,
        validation::validate_packet_id,
    },
};

use super::{DecodablePacket, EncodablePacket, PacketError};

/// A topic filter with the maximum `QoS` requested for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribeTopic {
    pub filter: String,
    pub qos: QoS,
}

impl SubscribeTopic {
    pub fn new(filter: impl Into<String>, qos: QoS) -> Self {
        Self { filter: filter.into(), qos }
    }
}

/// The SUBSCRIBE control packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribePacket {
    pub packet_id: u16,
    pub topics: Vec<SubscribeTopic>,
}

impl EncodablePacket for SubscribePacket {
    fn encode(&self) -> Result<Frame, PacketError> {
        if self.topics.is_empty() {
            return Err(PacketError::ProtocolError(Some(
                "Subscribe must contain at least one topic filter".into(),
            )));
        }

        let mut buf = BytesMut::new();
        buf.put_u16(validate_packet_id(Some(self.packet_id))?);

        for topic in &self.topics {
            write_utf8_string(&mut buf, &topic.filter)?;
            buf.put_u8(topic.qos.to_u8());
        }

        Frame::new(PacketType::Subscribe.control_byte(), buf)
    }
}

impl DecodablePacket for SubscribePacket {
    fn packet_type() -> PacketType {
        PacketType::Subscribe
    }

    fn reserved_flags() -> Option<u8> {
        Some(0b0010)
    }

    fn decode_payload(_control: u8, mut payload: Bytes) -> Result<Self, PacketError> {
        let packet_id = decode_u16(&mut payload)?;

        if !payload.has_remaining() {
            return Err(PacketError::ProtocolError(Some(
                "Subscribe must contain at least one topic filter".into(),
            )));
        }

        let mut topics = Vec::new();
        while payload.has_remaining() {
            let filter = decode_utf8_string(&mut payload)?;

            let requested_qos = decode_u8(&mut payload)?;

            // Upper 6 bits are reserved
            if requested_qos & 0b1111_1100 != 0 {
                return Err(PacketError::MalformedPacket(Some(
                    "Subscription options are reserved".into(),
                )));
            }

            let qos = QoS::from_u8(requested_qos).ok_or_else(|| {
                PacketError::MalformedPacket(Some(format!(
                    "Requested QoS must be 0, 1 or 2. Got: {requested_qos}"
                )))
            })?;

            topics.push(SubscribeTopic { filter, qos });
        }

        Ok(Self { packet_id, topics })
    }
}
