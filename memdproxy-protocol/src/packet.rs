//! Binary packet format.
//!
//! Classic packet layout (24-byte header + body):
//!
//! ```text
//! +-------+--------+---------+--------+----------+----------------+
//! | magic | opcode | key len | extras | datatype | vbucket/status |
//! | 1 byte| 1 byte | 2 bytes | 1 byte |  1 byte  |    2 bytes     |
//! +-------+--------+---------+--------+----------+----------------+
//! | total body len | opaque  |           cas             |
//! |    4 bytes     | 4 bytes |         8 bytes           |
//! +----------------+---------+---------------------------+
//! | extras | key | value                                 |
//! +--------+-----+---------------------------------------+
//! ```
//!
//! The flexible variant (magics `0x08`/`0x18`) narrows the key length to one
//! byte and spends the freed byte on a framing-extras length; the framing
//! extras precede the extras in the body. Bytes 6..8 carry the vbucket id on
//! requests and the status code on responses. All integers are big-endian.

use crate::command;
use crate::error::ProtocolError;
use crate::feature::{self, FeatureSet};
use crate::{HEADER_SIZE, MAX_BODY_SIZE};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::fmt;

/// Magic values on the wire.
const MAGIC_REQ: u8 = 0x80;
const MAGIC_RES: u8 = 0x81;
const MAGIC_REQ_FLEX: u8 = 0x08;
const MAGIC_RES_FLEX: u8 = 0x18;

/// Packet direction tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Magic {
    Request,
    Response,
}

impl Magic {
    /// Parses a wire magic byte; the second element reports whether the
    /// packet uses the flexible-framing header.
    pub fn from_wire(byte: u8) -> Result<(Magic, bool), ProtocolError> {
        match byte {
            MAGIC_REQ => Ok((Magic::Request, false)),
            MAGIC_RES => Ok((Magic::Response, false)),
            MAGIC_REQ_FLEX => Ok((Magic::Request, true)),
            MAGIC_RES_FLEX => Ok((Magic::Response, true)),
            other => Err(ProtocolError::InvalidMagic(other)),
        }
    }

    /// The wire byte for this magic in the given framing variant.
    pub fn to_wire(self, flexible: bool) -> u8 {
        match (self, flexible) {
            (Magic::Request, false) => MAGIC_REQ,
            (Magic::Response, false) => MAGIC_RES,
            (Magic::Request, true) => MAGIC_REQ_FLEX,
            (Magic::Response, true) => MAGIC_RES_FLEX,
        }
    }

    /// The classic (non-flexible) wire byte, the value scripts see.
    pub fn classic_wire(self) -> u8 {
        self.to_wire(false)
    }

    pub fn is_request(self) -> bool {
        matches!(self, Magic::Request)
    }

    pub fn is_response(self) -> bool {
        matches!(self, Magic::Response)
    }
}

impl fmt::Display for Magic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Magic::Request => write!(f, "request"),
            Magic::Response => write!(f, "response"),
        }
    }
}

/// A parsed protocol packet.
///
/// `vbucket` is meaningful only on requests and `status` only on responses;
/// the other field is zero. `flexible` records which header variant the
/// packet arrived with and `framing_extras` preserves the flexible-framing
/// section opaquely, so forwarded packets round-trip bit-for-bit even when
/// a flexible header carries no framing extras. Script-built packets leave
/// both unset and pick up the flexible wire form only when they carry
/// framing extras.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub magic: Magic,
    pub flexible: bool,
    pub opcode: u8,
    pub datatype: u8,
    pub status: u16,
    pub vbucket: u16,
    pub opaque: u32,
    pub cas: u64,
    pub collection_id: u32,
    pub key: Bytes,
    pub extras: Bytes,
    pub value: Bytes,
    pub framing_extras: Bytes,
}

impl Default for Packet {
    fn default() -> Self {
        Self {
            magic: Magic::Request,
            flexible: false,
            opcode: 0,
            datatype: 0,
            status: 0,
            vbucket: 0,
            opaque: 0,
            cas: 0,
            collection_id: 0,
            key: Bytes::new(),
            extras: Bytes::new(),
            value: Bytes::new(),
            framing_extras: Bytes::new(),
        }
    }
}

impl Packet {
    /// Attempts to decode the next packet from the buffer.
    ///
    /// Returns `Ok(Some(packet))` if a complete packet was decoded,
    /// `Ok(None)` if more data is needed, or `Err` on protocol errors.
    /// When the COLLECTIONS feature is enabled, keys of collection-scoped
    /// requests have their leading collection id stripped into
    /// [`Packet::collection_id`].
    pub fn decode(
        buf: &mut BytesMut,
        features: &FeatureSet,
    ) -> Result<Option<Packet>, ProtocolError> {
        if buf.len() < HEADER_SIZE {
            return Ok(None);
        }

        let (magic, flexible) = Magic::from_wire(buf[0])?;
        let opcode = buf[1];
        let (framing_len, key_len) = if flexible {
            (buf[2] as usize, buf[3] as usize)
        } else {
            (0, u16::from_be_bytes([buf[2], buf[3]]) as usize)
        };
        let extras_len = buf[4] as usize;
        let datatype = buf[5];
        let field = u16::from_be_bytes([buf[6], buf[7]]);
        let body_len = u32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]);
        if body_len > MAX_BODY_SIZE {
            return Err(ProtocolError::BodyTooLarge {
                size: body_len,
                max: MAX_BODY_SIZE,
            });
        }
        let body_len = body_len as usize;
        let sections = framing_len + key_len + extras_len;
        if sections > body_len {
            return Err(ProtocolError::LengthMismatch {
                body: body_len,
                sections,
            });
        }
        if buf.len() < HEADER_SIZE + body_len {
            return Ok(None);
        }

        let opaque = u32::from_be_bytes([buf[12], buf[13], buf[14], buf[15]]);
        let cas = u64::from_be_bytes([
            buf[16], buf[17], buf[18], buf[19], buf[20], buf[21], buf[22], buf[23],
        ]);

        buf.advance(HEADER_SIZE);
        let framing_extras = buf.split_to(framing_len).freeze();
        let mut key = buf.split_to(key_len).freeze();
        let extras = buf.split_to(extras_len).freeze();
        let value = buf.split_to(body_len - sections).freeze();

        let mut collection_id = 0;
        if magic.is_request()
            && features.contains(feature::COLLECTIONS)
            && command::is_collection_scoped(opcode)
            && !key.is_empty()
        {
            let (cid, consumed) = decode_uleb128(&key)?;
            collection_id = cid;
            key = key.slice(consumed..);
        }

        let (vbucket, status) = match magic {
            Magic::Request => (field, 0),
            Magic::Response => (0, field),
        };

        Ok(Some(Packet {
            magic,
            flexible,
            opcode,
            datatype,
            status,
            vbucket,
            opaque,
            cas,
            collection_id,
            key,
            extras,
            value,
            framing_extras,
        }))
    }

    /// Encodes the packet into bytes, applying the connection's negotiated
    /// framing (collection-id key prefix, flexible header).
    pub fn encode(&self, features: &FeatureSet) -> Result<BytesMut, ProtocolError> {
        let flexible = self.flexible || !self.framing_extras.is_empty();
        if self.framing_extras.len() > u8::MAX as usize {
            return Err(ProtocolError::FramingTooLong(self.framing_extras.len()));
        }

        let prefix_collection = self.magic.is_request()
            && features.contains(feature::COLLECTIONS)
            && command::is_collection_scoped(self.opcode);
        let mut key = BytesMut::with_capacity(self.key.len() + 5);
        if prefix_collection {
            encode_uleb128(self.collection_id, &mut key);
        }
        key.put_slice(&self.key);

        let max_key = if flexible {
            u8::MAX as usize
        } else {
            u16::MAX as usize
        };
        if key.len() > max_key {
            return Err(ProtocolError::KeyTooLong {
                len: key.len(),
                max: max_key,
            });
        }

        let body_len =
            self.framing_extras.len() + key.len() + self.extras.len() + self.value.len();
        if body_len > MAX_BODY_SIZE as usize {
            return Err(ProtocolError::BodyTooLarge {
                size: body_len as u32,
                max: MAX_BODY_SIZE,
            });
        }

        let mut buf = BytesMut::with_capacity(HEADER_SIZE + body_len);
        buf.put_u8(self.magic.to_wire(flexible));
        buf.put_u8(self.opcode);
        if flexible {
            buf.put_u8(self.framing_extras.len() as u8);
            buf.put_u8(key.len() as u8);
        } else {
            buf.put_u16(key.len() as u16);
        }
        buf.put_u8(self.extras.len() as u8);
        buf.put_u8(self.datatype);
        buf.put_u16(match self.magic {
            Magic::Request => self.vbucket,
            Magic::Response => self.status,
        });
        buf.put_u32(body_len as u32);
        buf.put_u32(self.opaque);
        buf.put_u64(self.cas);
        buf.put_slice(&self.framing_extras);
        buf.put_slice(&key);
        buf.put_slice(&self.extras);
        buf.put_slice(&self.value);
        Ok(buf)
    }

    /// The canonical name of this packet's opcode, if known.
    pub fn command_name(&self) -> Option<&'static str> {
        command::name(self.opcode)
    }
}

/// Decodes an unsigned LEB128 integer from the front of `buf`, returning the
/// value and the number of bytes consumed.
fn decode_uleb128(buf: &[u8]) -> Result<(u32, usize), ProtocolError> {
    let mut value: u32 = 0;
    let mut shift = 0;
    for (i, &byte) in buf.iter().enumerate() {
        if shift >= 32 {
            return Err(ProtocolError::InvalidCollectionId);
        }
        value |= ((byte & 0x7f) as u32) << shift;
        if byte & 0x80 == 0 {
            return Ok((value, i + 1));
        }
        shift += 7;
    }
    Err(ProtocolError::InvalidCollectionId)
}

/// Appends `value` as unsigned LEB128.
fn encode_uleb128(mut value: u32, out: &mut BytesMut) {
    loop {
        let mut byte = (value & 0x7f) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
            out.put_u8(byte);
        } else {
            out.put_u8(byte);
            break;
        }
    }
}
