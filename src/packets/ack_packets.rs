//! Packets whose variable header is a bare packet identifier.

use bytes::{BufMut, Bytes, BytesMut};

use crate::{
    frame::Frame,
    protocol::{decoding::decode_u16, packet_type::PacketType},
};

use super::{ensure_consumed, DecodablePacket, EncodablePacket, PacketError};

macro_rules! packet_id_packet {
    ($(#[$meta:meta])* $name:ident, $packet_type:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub struct $name {
            pub packet_id: u16,
        }

        impl $name {
            pub fn new(packet_id: u16) -> Self {
                Self { packet_id }
            }
        }

        impl EncodablePacket for $name {
            fn encode(&self) -> Result<Frame, PacketError> {
                let mut buf = BytesMut::with_capacity(2);
                buf.put_u16(self.packet_id);

                Frame::new($packet_type.control_byte(), buf)
            }
        }

        impl DecodablePacket for $name {
            fn packet_type() -> PacketType {
                $packet_type
            }

            fn decode_payload(_control: u8, mut payload: Bytes) -> Result<Self, PacketError> {
                let packet_id = decode_u16(&mut payload)?;
                ensure_consumed(&payload, $packet_type)?;

                Ok(Self { packet_id })
            }
        }
    };
}

packet_id_packet!(
    /// Acknowledges a `QoS` 1 PUBLISH.
    PubAckPacket,
    PacketType::PubAck
);

packet_id_packet!(
    /// First answer of the `QoS` 2 handshake.
    PubRecPacket,
    PacketType::PubRec
);

packet_id_packet!(
    /// Releases a `QoS` 2 message. Encoded with the reserved flags `0b0010`.
    PubRelPacket,
    PacketType::PubRel
);

packet_id_packet!(
    /// Completes the `QoS` 2 handshake.
    PubCompPacket,
    PacketType::PubComp
);

packet_id_packet!(UnsubAckPacket, PacketType::UnsubAck);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pub_rel_carries_reserved_flags() {
        let bytes = PubRelPacket::new(0x0102).encode().unwrap().serialize();
        assert_eq!(&bytes[..], &[0x62, 0x02, 0x01, 0x02]);
    }

    #[test]
    fn pub_rel_decode_accepts_zero_flags() {
        let frame = Frame::new(0x60, vec![0x00, 0x07]).unwrap();
        assert_eq!(PubRelPacket::decode(&frame).unwrap().packet_id, 7);
    }

    #[test]
    fn rejects_wrong_length() {
        let short = Frame::new(0x40, vec![0x00]).unwrap();
        assert!(PubAckPacket::decode(&short).is_err());

        let long = Frame::new(0xB0, vec![0x00, 0x01, 0x02]).unwrap();
        assert!(UnsubAckPacket::decode(&long).is_err());
    }
}
