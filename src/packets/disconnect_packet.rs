use bytes::Bytes;

use crate::{frame::Frame, protocol::packet_type::PacketType};

use super::{ensure_consumed, DecodablePacket, EncodablePacket, PacketError};

/// Announces a clean close of the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DisconnectPacket;

impl EncodablePacket for DisconnectPacket {
    fn encode(&self) -> Result<Frame, PacketError> {
        Frame::new(PacketType::Disconnect.control_byte(), Bytes::new())
    }
}

impl DecodablePacket for DisconnectPacket {
    fn packet_type() -> PacketType {
        PacketType::Disconnect
    }

    fn reserved_flags() -> Option<u8> {
        Some(0)
    }

    fn decode_payload(_control: u8, payload: Bytes) -> Result<Self, PacketError> {
        ensure_consumed(&payload, PacketType::Disconnect)?;

        Ok(Self)
    }
}
