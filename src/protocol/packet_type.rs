use std::fmt;

use crate::constants::{
    CONNACK_IDENTIFIER, CONNECT_IDENTIFIER, DISCONNECT_IDENTIFIER, PINGREQ_IDENTIFIER,
    PINGRESP_IDENTIFIER, PUBACK_IDENTIFIER, PUBCOMP_IDENTIFIER, PUBLISH_IDENTIFIER,
    PUBREC_IDENTIFIER, PUBREL_IDENTIFIER, SUBACK_IDENTIFIER, SUBSCRIBE_IDENTIFIER,
    UNSUBACK_IDENTIFIER, UNSUBSCRIBE_IDENTIFIER,
};

/// Represents the MQTT 3.1.1 Control Packet Types.
///
/// Type `15` (AUTH) only exists in MQTT 5 and is rejected by [`PacketType::from_u8`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketType {
    /// Connection request.
    /// Sent by: Client to Server.
    Connect = CONNECT_IDENTIFIER as isize,

    /// Connect acknowledgment.
    /// Sent by: Server to Client.
    ConnAck = CONNACK_IDENTIFIER as isize,

    /// Publish message.
    /// Sent by: Client to Server or Server to Client.
    Publish = PUBLISH_IDENTIFIER as isize,

    /// Publish acknowledgment (`QoS` 1).
    PubAck = PUBACK_IDENTIFIER as isize,

    /// Publish received (`QoS` 2 delivery part 1).
    PubRec = PUBREC_IDENTIFIER as isize,

    /// Publish release (`QoS` 2 delivery part 2).
    PubRel = PUBREL_IDENTIFIER as isize,

    /// Publish complete (`QoS` 2 delivery part 3).
    PubComp = PUBCOMP_IDENTIFIER as isize,

    /// Subscribe request.
    /// Sent by: Client to Server.
    Subscribe = SUBSCRIBE_IDENTIFIER as isize,

    /// Subscribe acknowledgment.
    /// Sent by: Server to Client.
    SubAck = SUBACK_IDENTIFIER as isize,

    /// Unsubscribe request.
    /// Sent by: Client to Server.
    Unsubscribe = UNSUBSCRIBE_IDENTIFIER as isize,

    /// Unsubscribe acknowledgment.
    /// Sent by: Server to Client.
    UnsubAck = UNSUBACK_IDENTIFIER as isize,

    /// PING request.
    PingReq = PINGREQ_IDENTIFIER as isize,

    /// PING response.
    PingResp = PINGRESP_IDENTIFIER as isize,

    /// Disconnect notification.
    Disconnect = DISCONNECT_IDENTIFIER as isize,
}

impl PacketType {
    /// Converts the type nibble of a fixed header to a `PacketType`.
    ///
    /// Returns `None` if the value does not match a supported type.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            CONNECT_IDENTIFIER => Some(Self::Connect),
            CONNACK_IDENTIFIER => Some(Self::ConnAck),
            PUBLISH_IDENTIFIER => Some(Self::Publish),
            PUBACK_IDENTIFIER => Some(Self::PubAck),
            PUBREC_IDENTIFIER => Some(Self::PubRec),
            PUBREL_IDENTIFIER => Some(Self::PubRel),
            PUBCOMP_IDENTIFIER => Some(Self::PubComp),
            SUBSCRIBE_IDENTIFIER => Some(Self::Subscribe),
            SUBACK_IDENTIFIER => Some(Self::SubAck),
            UNSUBSCRIBE_IDENTIFIER => Some(Self::Unsubscribe),
            UNSUBACK_IDENTIFIER => Some(Self::UnsubAck),
            PINGREQ_IDENTIFIER => Some(Self::PingReq),
            PINGRESP_IDENTIFIER => Some(Self::PingResp),
            DISCONNECT_IDENTIFIER => Some(Self::Disconnect),
            _ => None,
        }
    }

    /// Converts the `PacketType` to its numeric value.
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Computes the control byte for the MQTT fixed header.
    ///
    /// The control byte is the first byte of the MQTT fixed header, consisting of:
    /// - The packet type (4 most significant bits)
    /// - Packet flags (4 least significant bits)
    ///
    /// For the `Publish` packet type, the `QoS`, retain and DUP flags are dynamic and
    /// must be added by the caller.
    ///
    /// # Fixed Header Format
    ///
    /// | Bit       | 7   | 6   | 5   | 4   | 3   | 2   | 1   | 0   |
    /// |-----------|-----|-----|-----|-----|-----|-----|-----|-----|
    /// | Byte 1    | Packet type           | Packet flags          |
    /// | Byte 2    | Remaining Length                              |
    pub fn control_byte(self) -> u8 {
        match self {
            // For these packets, the 4 LSB are reserved and must be: 0000
            Self::Connect
            | Self::ConnAck
            | Self::Publish
            | Self::PubAck
            | Self::PubRec
            | Self::PubComp
            | Self::SubAck
            | Self::UnsubAck
            | Self::PingReq
            | Self::PingResp
            | Self::Disconnect => self.to_u8() << 4,

            // For these packets, the 4 LSB are reserved and must be: 0010
            Self::PubRel | Self::Subscribe | Self::Unsubscribe => self.to_u8() << 4 | 0b0000_0010,
        }
    }
}

impl fmt::Display for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            Self::Connect => "CONNECT",
            Self::ConnAck => "CONNACK",
            Self::Publish => "PUBLISH",
            Self::PubAck => "PUBACK",
            Self::PubRec => "PUBREC",
            Self::PubRel => "PUBREL",
            Self::PubComp => "PUBCOMP",
            Self::Subscribe => "SUBSCRIBE",
            Self::SubAck => "SUBACK",
            Self::Unsubscribe => "UNSUBSCRIBE",
            Self::UnsubAck => "UNSUBACK",
            Self::PingReq => "PINGREQ",
            Self::PingResp => "PINGRESP",
            Self::Disconnect => "DISCONNECT",
        };

        write!(f, "{value}")
    }
}
