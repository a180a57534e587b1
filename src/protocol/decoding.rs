use bytes::{Buf, Bytes};

use crate::packets::PacketError;

/// Decode a variable byte integer from the start of `buf`.
///
/// Reference: <https://docs.oasis-open.org/mqtt/mqtt/v3.1.1/os/mqtt-v3.1.1-os.html#_Toc398718023>
///
/// **Specification:**
///
/// ```text
/// multiplier = 1
/// value = 0
/// do
///    encodedByte = 'next byte from stream'
///    value += (encodedByte AND 127) * multiplier
///    if (multiplier > 128*128*128)
///       throw Error(Malformed Variable Byte Integer)
///    multiplier *= 128
/// while ((encodedByte AND 128) != 0)
/// ```
///
/// where AND is the bit-wise and operator (& in C).
///
/// Returns the decoded value and the number of bytes it occupied, or `None` when
/// `buf` ends before the final byte of the integer.
///
/// # Errors
/// - Returns `PacketError::MalformedPacket` if the integer spans more than 4 bytes.
pub(crate) fn decode_variable_byte_int(buf: &[u8]) -> Result<Option<(u32, usize)>, PacketError> {
    let mut multiplier: u32 = 1;
    let mut decoded_value: u32 = 0;

    for (index, encoded_byte) in buf.iter().enumerate() {
        // At most 4 bytes
        if multiplier > 128 * 128 * 128 {
            return Err(PacketError::MalformedPacket(Some(
                "Malformed variable byte integer".into(),
            )));
        }

        // Take the 7 least significant bits
        decoded_value += u32::from(encoded_byte & 127) * multiplier;

        // If the continuation bit is not set, we are done
        if encoded_byte & 128 == 0 {
            return Ok(Some((decoded_value, index + 1)));
        }

        multiplier *= 128;
    }

    Ok(None)
}

/// Decode a 1-byte unsigned integer.
///
/// # Errors
/// - Returns `PacketError::MalformedPacket` if the buffer is exhausted.
pub(crate) fn decode_u8(buf: &mut Bytes) -> Result<u8, PacketError> {
    if buf.remaining() < 1 {
        return Err(PacketError::MalformedPacket(Some("Failed to read u8".into())));
    }

    Ok(buf.get_u8())
}

/// Decode a 2-byte big-endian unsigned integer.
///
/// # Errors
/// - Returns `PacketError::MalformedPacket` if the buffer is exhausted.
pub(crate) fn decode_u16(buf: &mut Bytes) -> Result<u16, PacketError> {
    if buf.remaining() < 2 {
        return Err(PacketError::MalformedPacket(Some("Failed to read u16".into())));
    }

    Ok(buf.get_u16())
}

/// Decode length-prefixed binary data.
///
/// # Errors
/// - Returns `PacketError::MalformedPacket` if the length or the data cannot be read.
pub(crate) fn decode_binary_data(buf: &mut Bytes) -> Result<Bytes, PacketError> {
    let len = decode_u16(buf)
        .map_err(|_| PacketError::MalformedPacket(Some("Failed to read binary data length".into())))?
        as usize;

    if buf.remaining() < len {
        return Err(PacketError::MalformedPacket(Some(format!(
            "Failed to read binary data with length {len}"
        ))));
    }

    Ok(buf.split_to(len))
}

/// Decode a length-prefixed UTF-8 string.
///
/// # Errors
/// - Returns `PacketError::MalformedPacket` if reading fails or the string is invalid UTF-8.
pub(crate) fn decode_utf8_string(buf: &mut Bytes) -> Result<String, PacketError> {
    let encoded_value = decode_binary_data(buf)?;

    String::from_utf8(encoded_value.to_vec())
        .map_err(|_| PacketError::MalformedPacket(Some("String is not valid UTF-8".into())))
}
