//! Protocol error types.

use thiserror::Error;

/// Errors produced while reading or writing packets.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The peer closed the connection cleanly at a packet boundary.
    #[error("end of stream")]
    EndOfStream,

    #[error("connection reset by peer")]
    ConnectionReset,

    #[error("connection closed")]
    ConnectionClosed,

    #[error("invalid magic byte {0:#04x}")]
    InvalidMagic(u8),

    #[error("declared body length {body} shorter than header sections ({sections})")]
    LengthMismatch { body: usize, sections: usize },

    #[error("body too large: {size} bytes (max {max})")]
    BodyTooLarge { size: u32, max: u32 },

    #[error("key too long: {len} bytes (max {max})")]
    KeyTooLong { len: usize, max: usize },

    #[error("framing extras too long: {0} bytes (max 255)")]
    FramingTooLong(usize),

    #[error("truncated or oversized collection id prefix")]
    InvalidCollectionId,

    /// The stream ended in the middle of a packet.
    #[error("stream closed mid-packet")]
    TruncatedPacket,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProtocolError {
    /// Returns whether this is a clean close at a packet boundary.
    pub fn is_clean_close(&self) -> bool {
        matches!(self, ProtocolError::EndOfStream)
    }

    /// Returns whether the peer is gone, cleanly or not.
    pub fn is_disconnect(&self) -> bool {
        matches!(
            self,
            ProtocolError::EndOfStream
                | ProtocolError::ConnectionReset
                | ProtocolError::ConnectionClosed
        )
    }

    /// Maps an I/O error to the closest protocol-level disconnect variant.
    pub(crate) fn from_io(err: std::io::Error) -> Self {
        use std::io::ErrorKind;
        match err.kind() {
            ErrorKind::ConnectionReset => ProtocolError::ConnectionReset,
            ErrorKind::ConnectionAborted | ErrorKind::BrokenPipe | ErrorKind::NotConnected => {
                ProtocolError::ConnectionClosed
            }
            ErrorKind::UnexpectedEof => ProtocolError::TruncatedPacket,
            _ => ProtocolError::Io(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Error as IoError, ErrorKind};

    #[test]
    fn test_disconnect_classification() {
        assert!(ProtocolError::EndOfStream.is_clean_close());
        assert!(ProtocolError::EndOfStream.is_disconnect());
        assert!(ProtocolError::ConnectionReset.is_disconnect());
        assert!(ProtocolError::ConnectionClosed.is_disconnect());
        assert!(!ProtocolError::ConnectionReset.is_clean_close());
        assert!(!ProtocolError::InvalidMagic(0x42).is_disconnect());
    }

    #[test]
    fn test_from_io_mapping() {
        let err = ProtocolError::from_io(IoError::new(ErrorKind::ConnectionReset, "reset"));
        assert!(matches!(err, ProtocolError::ConnectionReset));

        let err = ProtocolError::from_io(IoError::new(ErrorKind::BrokenPipe, "pipe"));
        assert!(matches!(err, ProtocolError::ConnectionClosed));

        let err = ProtocolError::from_io(IoError::new(ErrorKind::Other, "other"));
        assert!(matches!(err, ProtocolError::Io(_)));
    }
}
