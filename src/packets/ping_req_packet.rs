use bytes::Bytes;

use crate::{frame::Frame, protocol::packet_type::PacketType};

use super::{ensure_consumed, DecodablePacket, EncodablePacket, PacketError};

/// Liveness check sent by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PingReqPacket;

impl EncodablePacket for PingReqPacket {
    fn encode(&self) -> Result<Frame, PacketError> {
        Frame::new(PacketType::PingReq.control_byte(), Bytes::new())
    }
}

impl DecodablePacket for PingReqPacket {
    fn packet_type() -> PacketType {
        PacketType::PingReq
    }

    fn reserved_flags() -> Option<u8> {
        Some(0)
    }

    fn decode_payload(_control: u8, payload: Bytes) -> Result<Self, PacketError> {
        ensure_consumed(&payload, PacketType::PingReq)?;

        Ok(Self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_two_bytes() {
        assert_eq!(&PingReqPacket.encode().unwrap().serialize()[..], &[0xC0, 0x00]);
    }

    #[test]
    fn rejects_flags_and_payload() {
        let flagged = Frame::new(0xC1, Bytes::new()).unwrap();
        assert!(matches!(PingReqPacket::decode(&flagged), Err(PacketError::MalformedPacket(_))));

        let with_payload = Frame::new(0xC0, vec![0x00]).unwrap();
        assert!(PingReqPacket::decode(&with_payload).is_err());
    }
}
