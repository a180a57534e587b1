use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};

use crate::{
    frame::Frame,
    protocol::{decoding::decode_u8, packet_type::PacketType},
};

use super::{ensure_consumed, DecodablePacket, EncodablePacket, PacketError};

/// Connect return codes of MQTT 3.1.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectReturnCode {
    Accepted = 0x00,
    UnacceptableProtocolVersion = 0x01,
    IdentifierRejected = 0x02,
    ServerUnavailable = 0x03,
    BadUsernameOrPassword = 0x04,
    NotAuthorized = 0x05,
}

impl ConnectReturnCode {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(Self::Accepted),
            0x01 => Some(Self::UnacceptableProtocolVersion),
            0x02 => Some(Self::IdentifierRejected),
            0x03 => Some(Self::ServerUnavailable),
            0x04 => Some(Self::BadUsernameOrPassword),
            0x05 => Some(Self::NotAuthorized),
            _ => None,
        }
    }

    pub fn to_u8(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for ConnectReturnCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Accepted => write!(f, "Connection accepted"),
            Self::UnacceptableProtocolVersion => {
                write!(f, "Unacceptable protocol version")
            }
            Self::IdentifierRejected => write!(f, "Identifier rejected"),
            Self::ServerUnavailable => write!(f, "Server unavailable"),
            Self::BadUsernameOrPassword => write!(f, "Bad user name or password"),
            Self::NotAuthorized => write!(f, "Not authorized"),
        }
    }
}

/// The CONNACK control packet.
///
/// The return code is kept raw so that codes outside of 0-5 still reach the caller.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConnAckPacket {
    pub session_present: bool,
    pub return_code: u8,
}

impl ConnAckPacket {
    pub fn accepted(&self) -> bool {
        self.return_code == ConnectReturnCode::Accepted.to_u8()
    }
}

impl EncodablePacket for ConnAckPacket {
    fn encode(&self) -> Result<Frame, PacketError> {
        let mut buf = BytesMut::with_capacity(2);

        buf.put_u8(u8::from(self.session_present));
        buf.put_u8(self.return_code);

        Frame::new(PacketType::ConnAck.control_byte(), buf)
    }
}

impl DecodablePacket for ConnAckPacket {
    fn packet_type() -> PacketType {
        PacketType::ConnAck
    }

    fn reserved_flags() -> Option<u8> {
        Some(0)
    }

    fn decode_payload(_control: u8, mut payload: Bytes) -> Result<Self, PacketError> {
        let acknowledge_flags = decode_u8(&mut payload)?;

        // Only bit 0 (session present) is defined
        if acknowledge_flags & 0b1111_1110 != 0 {
            return Err(PacketError::MalformedPacket(Some(
                "Connect acknowledge flags are reserved".into(),
            )));
        }

        let return_code = decode_u8(&mut payload)?;

        ensure_consumed(&payload, PacketType::ConnAck)?;

        Ok(Self { session_present: acknowledge_flags == 1, return_code })
    }
}
