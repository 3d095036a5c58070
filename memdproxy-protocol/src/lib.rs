//! # memdproxy-protocol
//!
//! Wire codec for the Couchbase memcached binary protocol.
//!
//! This crate provides:
//! - Packet encode/decode over a byte buffer, including the flexible-framing
//!   header variant and collection-id key prefixes
//! - Async reader/writer halves over any byte stream
//! - Per-connection negotiated-feature tracking
//! - Opcode, status, and HELO feature name tables

pub mod command;
pub mod conn;
pub mod error;
pub mod feature;
pub mod packet;

pub use conn::{split_tcp, MemdReader, MemdWriter};
pub use error::ProtocolError;
pub use feature::{feature_name, FeatureSet};
pub use packet::{Magic, Packet};

/// Size of the fixed packet header in bytes.
pub const HEADER_SIZE: usize = 24;

/// Maximum total body size accepted by the codec (20 MiB, the document
/// size ceiling of the upstream servers this protocol fronts).
pub const MAX_BODY_SIZE: u32 = 20 * 1024 * 1024;
