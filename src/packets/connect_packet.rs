use bytes::{BufMut, Bytes, BytesMut};
use rand::{distributions::Alphanumeric, Rng};

use crate::{
    constants::{CLIENT_ID_PREFIX, MAX_CLIENT_ID_LENGTH, PROTOCOL_LEVEL, PROTOCOL_NAME},
    frame::Frame,
    protocol::{
        decoding::{decode_binary_data, decode_u16, decode_u8, decode_utf8_string},
        encoding::{write_binary_data, write_utf8_string},
        packet_type::PacketType,
        qos::QoS,
    },
};

use super::{ensure_consumed, DecodablePacket, EncodablePacket, PacketError};

const CLEAN_SESSION_FLAG: u8 = 0b0000_0010;
const WILL_FLAG: u8 = 0b0000_0100;
const WILL_RETAIN_FLAG: u8 = 0b0010_0000;
const PASSWORD_FLAG: u8 = 0b0100_0000;
const USERNAME_FLAG: u8 = 0b1000_0000;

/// Message the broker publishes on behalf of the client if it goes away uncleanly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Will {
    pub topic: String,
    pub message: Bytes,
    pub qos: QoS,
    pub retain: bool,
}

impl Will {
    pub fn new(topic: impl Into<String>, message: impl Into<Bytes>) -> Self {
        Self { topic: topic.into(), message: message.into(), qos: QoS::AtMostOnce, retain: false }
    }
}

/// The CONNECT control packet.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConnectPacket {
    /// The Client Identifier identifies the Client to the Server.
    /// When empty, a random identifier is generated on encode.
    pub client_id: String,

    /// Specifies whether the server discards any previous session state.
    pub clean_session: bool,

    /// Maximum interval in seconds between two control packets sent by the client.
    pub keep_alive: u16,

    pub will: Option<Will>,

    pub username: Option<String>,

    /// Although this field is called Password, it can carry any credential.
    pub password: Option<Bytes>,
}

impl ConnectPacket {
    fn connect_flags(&self) -> u8 {
        let mut flags = 0;

        if self.clean_session {
            flags |= CLEAN_SESSION_FLAG;
        }

        if let Some(will) = &self.will {
            flags |= WILL_FLAG;
            flags |= will.qos.to_u8() << 3;
            if will.retain {
                flags |= WILL_RETAIN_FLAG;
            }
        }

        if self.password.is_some() {
            flags |= PASSWORD_FLAG;
        }

        if self.username.is_some() {
            flags |= USERNAME_FLAG;
        }

        flags
    }
}

/// Generates a client identifier that fits the 3.1.1 length limit.
pub(crate) fn generate_client_id() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(MAX_CLIENT_ID_LENGTH - CLIENT_ID_PREFIX.len())
        .map(char::from)
        .collect();

    format!("{CLIENT_ID_PREFIX}{suffix}")
}

impl EncodablePacket for ConnectPacket {
    fn encode(&self) -> Result<Frame, PacketError> {
        let mut buf = BytesMut::new();

        write_utf8_string(&mut buf, PROTOCOL_NAME)?;
        buf.put_u8(PROTOCOL_LEVEL);
        buf.put_u8(self.connect_flags());
        buf.put_u16(self.keep_alive);

        if self.client_id.is_empty() {
            write_utf8_string(&mut buf, &generate_client_id())?;
        } else {
            write_utf8_string(&mut buf, &self.client_id)?;
        }

        if let Some(will) = &self.will {
            write_utf8_string(&mut buf, &will.topic)?;
            write_binary_data(&mut buf, &will.message)?;
        }

        if let Some(username) = &self.username {
            write_utf8_string(&mut buf, username)?;
        }

        if let Some(password) = &self.password {
            write_binary_data(&mut buf, password)?;
        }

        Frame::new(PacketType::Connect.control_byte(), buf)
    }
}

impl DecodablePacket for ConnectPacket {
    fn packet_type() -> PacketType {
        PacketType::Connect
    }

    fn reserved_flags() -> Option<u8> {
        Some(0)
    }

    fn decode_payload(_control: u8, mut payload: Bytes) -> Result<Self, PacketError> {
        let protocol_name = decode_utf8_string(&mut payload)?;
        if protocol_name != PROTOCOL_NAME {
            return Err(PacketError::ProtocolError(Some(format!(
                "Unsupported protocol name: {protocol_name}"
            ))));
        }

        let protocol_level = decode_u8(&mut payload)?;
        if protocol_level != PROTOCOL_LEVEL {
            return Err(PacketError::ProtocolError(Some(format!(
                "Unsupported protocol level: {protocol_level}"
            ))));
        }

        let connect_flags = decode_u8(&mut payload)?;

        // Reserved connect flag (last bit) must be set to 0
        if connect_flags & 0x1 != 0x0 {
            return Err(PacketError::MalformedPacket(Some("Connect flags are reserved".into())));
        }

        let will_flag = connect_flags & WILL_FLAG != 0;
        let will_qos = QoS::from_u8(connect_flags >> 3 & 0b0000_0011).ok_or_else(|| {
            PacketError::MalformedPacket(Some("Will QoS must be 0, 1 or 2".into()))
        })?;
        let will_retain = connect_flags & WILL_RETAIN_FLAG != 0;

        if !will_flag && (will_retain || will_qos != QoS::AtMostOnce) {
            return Err(PacketError::MalformedPacket(Some(
                "Will QoS and retain must be 0 if will flag is 0".into(),
            )));
        }

        let keep_alive = decode_u16(&mut payload)?;
        let client_id = decode_utf8_string(&mut payload)?;

        let will = if will_flag {
            let topic = decode_utf8_string(&mut payload)?;
            let message = decode_binary_data(&mut payload)?;
            Some(Will { topic, message, qos: will_qos, retain: will_retain })
        } else {
            None
        };

        let username = if connect_flags & USERNAME_FLAG != 0 {
            Some(decode_utf8_string(&mut payload)?)
        } else {
            None
        };

        let password = if connect_flags & PASSWORD_FLAG != 0 {
            Some(decode_binary_data(&mut payload)?)
        } else {
            None
        };

        ensure_consumed(&payload, PacketType::Connect)?;

        Ok(Self {
            client_id,
            clean_session: connect_flags & CLEAN_SESSION_FLAG != 0,
            keep_alive,
            will,
            username,
            password,
        })
    }
}
