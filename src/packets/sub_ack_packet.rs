use bytes::{BufMut, Bytes, BytesMut};

use crate::{
    frame::Frame,
    protocol::{decoding::decode_u16, packet_type::PacketType},
};

use super::{DecodablePacket, EncodablePacket, PacketError};

/// The SUBACK control packet.
///
/// Holds one return code per requested filter, in request order: the granted
/// `QoS`, or `SUBACK_FAILURE`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubAckPacket {
    pub packet_id: u16,
    pub return_codes: Vec<u8>,
}

impl EncodablePacket for SubAckPacket {
    fn encode(&self) -> Result<Frame, PacketError> {
        let mut buf = BytesMut::with_capacity(2 + self.return_codes.len());

        buf.put_u16(self.packet_id);
        buf.put_slice(&self.return_codes);

        Frame::new(PacketType::SubAck.control_byte(), buf)
    }
}

impl DecodablePacket for SubAckPacket {
    fn packet_type() -> PacketType {
        PacketType::SubAck
    }

    fn decode_payload(_control: u8, mut payload: Bytes) -> Result<Self, PacketError> {
        let packet_id = decode_u16(&mut payload)?;

        Ok(Self { packet_id, return_codes: payload.to_vec() })
    }
}
