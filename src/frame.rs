use bytes::{BufMut, Bytes, BytesMut};
use log::error;

use crate::{
    constants::MAX_PACKET_SIZE,
    packets::PacketError,
    protocol::{
        decoding::decode_variable_byte_int, encoding::write_variable_byte_int,
        packet_type::PacketType,
    },
};

/// The wire-level unit: fixed header plus type-specific payload.
///
/// `payload` holds everything after the remaining length field, i.e. the variable
/// header and the payload of the control packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub control: u8,
    pub remaining_length: u32,
    pub payload: Bytes,
}

impl Frame {
    /// Builds a frame, deriving the remaining length from `payload`.
    ///
    /// # Errors
    /// - Returns `PacketError::PacketTooLarge` if the payload exceeds `MAX_PACKET_SIZE`.
    pub fn new(control: u8, payload: impl Into<Bytes>) -> Result<Self, PacketError> {
        let payload = payload.into();

        if payload.len() > MAX_PACKET_SIZE {
            return Err(PacketError::PacketTooLarge(Some(format!(
                "Packet size: {}, Maximum allowed: {MAX_PACKET_SIZE}",
                payload.len()
            ))));
        }

        // Bounded by MAX_PACKET_SIZE, fits in u32
        Ok(Self { control, remaining_length: payload.len() as u32, payload })
    }

    /// The type nibble of the control byte.
    pub fn type_nibble(&self) -> u8 {
        self.control >> 4
    }

    /// The packet type, if the type nibble is a supported one.
    pub fn packet_type(&self) -> Option<PacketType> {
        PacketType::from_u8(self.type_nibble())
    }

    /// The flags nibble of the control byte.
    pub fn flags(&self) -> u8 {
        self.control & 0x0F
    }

    /// Serializes the frame: control byte, remaining length, payload.
    pub fn serialize(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(1 + 4 + self.payload.len());

        buf.put_u8(self.control);
        // remaining_length is validated on construction and on parse
        if let Err(e) = write_variable_byte_int(&mut buf, self.remaining_length as usize) {
            error!("Serializing frame with invalid remaining length: {e}");
        }
        buf.put_slice(&self.payload);

        buf
    }

    /// Parses one frame from the start of `buf`.
    ///
    /// Returns the frame and the number of bytes it occupied, or `None` when `buf`
    /// does not yet hold a complete frame. Nothing is consumed from `buf`.
    ///
    /// # Errors
    /// - Returns `PacketError::MalformedPacket` if the remaining length is malformed.
    pub fn parse(buf: &[u8]) -> Result<Option<(Frame, usize)>, PacketError> {
        let Some((&control, rest)) = buf.split_first() else {
            return Ok(None);
        };

        let Some((remaining_length, len_bytes)) = decode_variable_byte_int(rest)? else {
            return Ok(None);
        };

        let header_len = 1 + len_bytes;
        let frame_len = header_len + remaining_length as usize;
        if buf.len() < frame_len {
            return Ok(None);
        }

        let payload = Bytes::copy_from_slice(&buf[header_len..frame_len]);

        Ok(Some((Frame { control, remaining_length, payload }, frame_len)))
    }
}
