use crate::{constants::MAX_STRING_LENGTH, packets::PacketError};

/// Validates a topic name used in a PUBLISH.
///
/// Reference: <https://docs.oasis-open.org/mqtt/mqtt/v3.1.1/os/mqtt-v3.1.1-os.html#_Toc398718106>
///
/// **Requirements:**
/// - Must not be empty.
/// - Length must be ≤ `MAX_STRING_LENGTH`.
/// - Must not contain the null character U+0000.
///
/// # Errors
/// - Returns `PacketError::ProtocolError` if the topic fails any of the validations.
pub(crate) fn validate_topic_name(topic: &str) -> Result<(), PacketError> {
    if topic.is_empty() {
        return Err(PacketError::ProtocolError(Some("Topic name can not be empty".into())));
    }

    if topic.len() > MAX_STRING_LENGTH {
        return Err(PacketError::ProtocolError(Some(format!(
            "Topic name length {} exceeds {MAX_STRING_LENGTH}",
            topic.len()
        ))));
    }

    if topic.contains('\0') {
        return Err(PacketError::ProtocolError(Some("Topic name contains U+0000".into())));
    }

    Ok(())
}

/// Validates a packet identifier of a `QoS` > 0 exchange.
///
/// # Errors
/// - Returns `PacketError::ProtocolError` if the id is missing or zero.
pub(crate) fn validate_packet_id(packet_id: Option<u16>) -> Result<u16, PacketError> {
    match packet_id {
        Some(packet_id) if packet_id != 0 => Ok(packet_id),
        _ => Err(PacketError::ProtocolError(Some("Non-zero PacketId required".into()))),
    }
}
