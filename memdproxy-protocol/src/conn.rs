//! Async reader/writer halves of a protocol connection.
//!
//! The two halves of one connection share a [`FeatureSet`]; enabling a
//! feature on either half changes the framing of every subsequent read and
//! write on that connection.

use crate::error::ProtocolError;
use crate::feature::FeatureSet;
use crate::packet::Packet;
use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

/// Initial capacity of the read buffer (8 KiB).
const READ_BUFFER_SIZE: usize = 8 * 1024;

/// Reads whole packets from a byte stream.
pub struct MemdReader<R> {
    io: R,
    buf: BytesMut,
    features: FeatureSet,
}

impl<R: AsyncRead + Unpin> MemdReader<R> {
    pub fn new(io: R, features: FeatureSet) -> Self {
        Self {
            io,
            buf: BytesMut::with_capacity(READ_BUFFER_SIZE),
            features,
        }
    }

    pub fn features(&self) -> &FeatureSet {
        &self.features
    }

    pub fn enable_feature(&self, code: u16) {
        self.features.enable(code);
    }

    /// Reads the next whole packet.
    ///
    /// # Errors
    ///
    /// [`ProtocolError::EndOfStream`] on a clean close at a packet boundary,
    /// [`ProtocolError::TruncatedPacket`] on a close mid-packet, the
    /// disconnect variants for reset/closed sockets, and the malformed-input
    /// variants from [`Packet::decode`].
    pub async fn read_packet(&mut self) -> Result<Packet, ProtocolError> {
        loop {
            if let Some(packet) = Packet::decode(&mut self.buf, &self.features)? {
                return Ok(packet);
            }
            let n = self
                .io
                .read_buf(&mut self.buf)
                .await
                .map_err(ProtocolError::from_io)?;
            if n == 0 {
                return Err(if self.buf.is_empty() {
                    ProtocolError::EndOfStream
                } else {
                    ProtocolError::TruncatedPacket
                });
            }
        }
    }
}

/// Writes whole packets to a byte stream.
pub struct MemdWriter<W> {
    io: W,
    features: FeatureSet,
}

impl<W: AsyncWrite + Unpin> MemdWriter<W> {
    pub fn new(io: W, features: FeatureSet) -> Self {
        Self { io, features }
    }

    pub fn features(&self) -> &FeatureSet {
        &self.features
    }

    pub fn enable_feature(&self, code: u16) {
        self.features.enable(code);
    }

    /// Writes one whole packet and flushes.
    pub async fn write_packet(&mut self, packet: &Packet) -> Result<(), ProtocolError> {
        let encoded = packet.encode(&self.features)?;
        self.io
            .write_all(&encoded)
            .await
            .map_err(ProtocolError::from_io)?;
        self.io.flush().await.map_err(ProtocolError::from_io)?;
        Ok(())
    }
}

/// Splits a TCP stream into protocol halves sharing one feature set.
pub fn split_tcp(stream: TcpStream) -> (MemdReader<OwnedReadHalf>, MemdWriter<OwnedWriteHalf>) {
    let features = FeatureSet::new();
    let (read, write) = stream.into_split();
    (
        MemdReader::new(read, features.clone()),
        MemdWriter::new(write, features),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command;
    use crate::packet::Magic;
    use bytes::Bytes;

    fn noop_request() -> Packet {
        Packet {
            magic: Magic::Request,
            opcode: command::NOOP,
            opaque: 7,
            ..Packet::default()
        }
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let (client, server) = tokio::io::duplex(1024);
        let features = FeatureSet::new();
        let mut writer = MemdWriter::new(client, features.clone());
        let mut reader = MemdReader::new(server, FeatureSet::new());

        let packet = Packet {
            key: Bytes::from_static(b"k"),
            value: Bytes::from_static(b"v"),
            ..noop_request()
        };
        writer.write_packet(&packet).await.unwrap();
        let read = reader.read_packet().await.unwrap();
        assert_eq!(read, packet);
    }

    #[tokio::test]
    async fn test_eof_at_packet_boundary() {
        let (client, server) = tokio::io::duplex(1024);
        let mut reader = MemdReader::new(server, FeatureSet::new());
        drop(client);

        let err = reader.read_packet().await.unwrap_err();
        assert!(err.is_clean_close());
    }

    #[tokio::test]
    async fn test_eof_mid_packet() {
        let (mut client, server) = tokio::io::duplex(1024);
        let mut reader = MemdReader::new(server, FeatureSet::new());

        let encoded = noop_request().encode(&FeatureSet::new()).unwrap();
        client.write_all(&encoded[..10]).await.unwrap();
        drop(client);

        let err = reader.read_packet().await.unwrap_err();
        assert!(matches!(err, ProtocolError::TruncatedPacket));
    }

    #[tokio::test]
    async fn test_reads_across_fragmented_writes() {
        let (mut client, server) = tokio::io::duplex(1024);
        let mut reader = MemdReader::new(server, FeatureSet::new());

        let packet = Packet {
            key: Bytes::from_static(b"fragmented"),
            ..noop_request()
        };
        let encoded = packet.encode(&FeatureSet::new()).unwrap();
        let handle = tokio::spawn(async move {
            for chunk in encoded.chunks(5) {
                client.write_all(chunk).await.unwrap();
                client.flush().await.unwrap();
            }
            client
        });

        let read = reader.read_packet().await.unwrap();
        assert_eq!(read, packet);
        drop(handle.await.unwrap());
    }
}
