//! Reassembly of MQTT frames from a chunked byte stream.
//!
//! Bytes are appended as they arrive from the transport. Complete frames are cut
//! from the head of the buffer, partial data stays buffered until the next push.

use bytes::{Buf, BytesMut};

use crate::{frame::Frame, packets::PacketError};

/// Append-only accumulator of inbound bytes.
#[derive(Debug)]
pub struct FrameBuffer {
    buffer: BytesMut,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self { buffer: BytesMut::with_capacity(4096) }
    }

    /// Appends bytes received from the transport.
    pub fn push(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Takes one complete frame from the head of the buffer.
    ///
    /// Returns `Ok(None)` while the buffered bytes do not hold a whole frame; in that
    /// case nothing is consumed.
    ///
    /// # Errors
    /// - Returns `PacketError::MalformedPacket` if the remaining length field is
    ///   malformed. The stream cannot be resynchronized after that, so the buffered
    ///   bytes are discarded.
    pub fn try_take_frame(&mut self) -> Result<Option<Frame>, PacketError> {
        match Frame::parse(&self.buffer) {
            Ok(Some((frame, consumed))) => {
                self.buffer.advance(consumed);
                Ok(Some(frame))
            }
            Ok(None) => Ok(None),
            Err(e) => {
                self.buffer.clear();
                Err(e)
            }
        }
    }

    /// Drains every complete frame currently buffered.
    pub fn frames(&mut self) -> Frames<'_> {
        Frames { buffer: self }
    }

    /// Number of buffered, not yet consumed bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Iterator over the complete frames of a [`FrameBuffer`].
///
/// Stops at the first incomplete frame. A malformed header is yielded once as an
/// error, after which the iterator ends.
pub struct Frames<'a> {
    buffer: &'a mut FrameBuffer,
}

impl Iterator for Frames<'_> {
    type Item = Result<Frame, PacketError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.buffer.try_take_frame().transpose()
    }
}
