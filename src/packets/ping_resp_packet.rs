use bytes::Bytes;

use crate::{frame::Frame, protocol::packet_type::PacketType};

use super::{ensure_consumed, DecodablePacket, EncodablePacket, PacketError};

/// Answer to a PINGREQ.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PingRespPacket;

impl EncodablePacket for PingRespPacket {
    fn encode(&self) -> Result<Frame, PacketError> {
        Frame::new(PacketType::PingResp.control_byte(), Bytes::new())
    }
}

impl DecodablePacket for PingRespPacket {
    fn packet_type() -> PacketType {
        PacketType::PingResp
    }

    fn reserved_flags() -> Option<u8> {
        Some(0)
    }

    fn decode_payload(_control: u8, payload: Bytes) -> Result<Self, PacketError> {
        ensure_consumed(&payload, PacketType::PingResp)?;

        Ok(Self)
    }
}
