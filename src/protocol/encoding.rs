use bytes::{BufMut, BytesMut};

use crate::{
    constants::{MAX_PACKET_SIZE, MAX_STRING_LENGTH},
    packets::PacketError,
};

/// Encode a variable byte integer.
///
/// Reference: <https://docs.oasis-open.org/mqtt/mqtt/v3.1.1/os/mqtt-v3.1.1-os.html#_Toc398718023>
///
/// **Specification:**
///
/// ```text
/// do
///    encodedByte = X MOD 128
///    X = X DIV 128
///    // if there are more data to encode, set the top bit of this byte
///    if (X > 0)
///       encodedByte = encodedByte OR 128
///    endif
///    'output' encodedByte
/// while (X > 0)
/// ```
///
/// where MOD is the modulo operator (% in C), DIV is integer division (/ in C), and OR is bit-wise or (| in C).
pub(crate) fn encode_variable_byte_int(mut value: u32) -> Vec<u8> {
    let capacity = match value {
        0..=127 => 1,
        128..=16_383 => 2,
        16_384..=2_097_151 => 3,
        _ => 4,
    };
    let mut encoded_value = Vec::with_capacity(capacity);

    for _ in 0..capacity {
        // Extract the 7 least significant bits from the current value
        let mut encoded_byte = (value % 128) as u8;

        // Remove the 7 bits just processed
        value /= 128;

        // If there are still remaining bits, mark this byte as continuation
        if value > 0 {
            encoded_byte |= 128;
        }

        encoded_value.push(encoded_byte);
    }

    encoded_value
}

/// Write a remaining length into `buf`.
///
/// # Errors
/// - Returns `PacketError::PacketTooLarge` if `value` exceeds `MAX_PACKET_SIZE`.
pub(crate) fn write_variable_byte_int(buf: &mut BytesMut, value: usize) -> Result<(), PacketError> {
    if value > MAX_PACKET_SIZE {
        return Err(PacketError::PacketTooLarge(Some(format!(
            "Remaining length {value} exceeds {MAX_PACKET_SIZE}"
        ))));
    }

    // Checked against MAX_PACKET_SIZE above, always fits in u32
    buf.put_slice(&encode_variable_byte_int(value as u32));

    Ok(())
}

/// Write a length-prefixed UTF-8 string.
///
/// Reference: <https://docs.oasis-open.org/mqtt/mqtt/v3.1.1/os/mqtt-v3.1.1-os.html#_Toc398718016>
///
/// # Errors
/// - Returns `PacketError::PacketTooLarge` if the string is longer than `MAX_STRING_LENGTH`.
pub(crate) fn write_utf8_string(buf: &mut BytesMut, value: &str) -> Result<(), PacketError> {
    write_binary_data(buf, value.as_bytes())
}

/// Write length-prefixed binary data.
///
/// The length must fit within 2 bytes (0 to 65_535).
///
/// # Errors
/// - Returns `PacketError::PacketTooLarge` if the data is longer than `MAX_STRING_LENGTH`.
pub(crate) fn write_binary_data(buf: &mut BytesMut, value: &[u8]) -> Result<(), PacketError> {
    let len = u16::try_from(value.len()).map_err(|_| {
        PacketError::PacketTooLarge(Some(format!(
            "Field length {} exceeds {MAX_STRING_LENGTH}",
            value.len()
        )))
    })?;

    buf.put_u16(len);
    buf.put_slice(value);

    Ok(())
}
