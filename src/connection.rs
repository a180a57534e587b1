use bytes::{Bytes, BytesMut};
use log::{debug, trace};
use tokio::io::{self, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::{packets::Packet, session::SessionError};

/// What the transport reported on a read.
#[derive(Debug)]
pub(crate) enum TransportEvent {
    Data(Bytes),

    /// The peer closed its side of the stream.
    End,

    Error(io::Error),
}

/// Splits `stream` into the inbound and outbound halves of a connection.
pub(crate) fn split<S>(stream: S) -> (ConnectionReader, ConnectionWriter)
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    let (reader, writer) = io::split(stream);

    (
        ConnectionReader { stream: Box::new(reader), buffer: BytesMut::with_capacity(4096) },
        ConnectionWriter { stream: Box::new(writer) },
    )
}

pub(crate) struct ConnectionReader {
    stream: Box<dyn AsyncRead + Send + Unpin>,
    buffer: BytesMut,
}

impl ConnectionReader {
    /// Waits for the next chunk of bytes from the transport.
    ///
    /// Cancel safe: no data is lost if the future is dropped before completion.
    pub(crate) async fn next_event(&mut self) -> TransportEvent {
        self.buffer.reserve(4096);

        match self.stream.read_buf(&mut self.buffer).await {
            Ok(0) => TransportEvent::End,
            Ok(_) => TransportEvent::Data(self.buffer.split().freeze()),
            Err(e) => TransportEvent::Error(e),
        }
    }
}

pub(crate) struct ConnectionWriter {
    stream: Box<dyn AsyncWrite + Send + Unpin>,
}

impl ConnectionWriter {
    /// Write a packet to the connection.
    pub(crate) async fn write_packet(&mut self, packet: &Packet) -> Result<(), SessionError> {
        let buf = packet.encode().map_err(SessionError::Packet)?.serialize();

        debug!("Sending packet >> {packet}");
        trace!("Sending bytes >> {}", hex::encode(&buf));

        self.stream.write_all(&buf).await.map_err(SessionError::TransportSend)?;
        self.stream.flush().await.map_err(SessionError::TransportSend)?;

        Ok(())
    }

    /// Closes the outbound half of the stream.
    pub(crate) async fn shutdown(&mut self) -> io::Result<()> {
        self.stream.shutdown().await
    }
}
