//! HELO feature codes and the per-connection feature set.
//!
//! Features are negotiated by the HELO exchange: the client advertises a
//! list of 16-bit codes and the server echoes the subset it accepts. Some
//! accepted features change how subsequent packets are framed, so the codec
//! consults the set on every read and write.

use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::Arc;

pub const DATATYPE: u16 = 0x01;
pub const TLS: u16 = 0x02;
pub const TCP_NODELAY: u16 = 0x03;
pub const MUTATION_SEQNO: u16 = 0x04;
pub const TCP_DELAY: u16 = 0x05;
pub const XATTR: u16 = 0x06;
pub const XERROR: u16 = 0x07;
pub const SELECT_BUCKET: u16 = 0x08;
pub const SNAPPY: u16 = 0x0a;
pub const JSON: u16 = 0x0b;
pub const DUPLEX: u16 = 0x0c;
pub const CLUSTERMAP_NOTIF: u16 = 0x0d;
pub const UNORDERED_EXEC: u16 = 0x0e;
pub const DURATIONS: u16 = 0x0f;
pub const ALT_REQUESTS: u16 = 0x10;
pub const SYNC_REPLICATION: u16 = 0x11;
pub const COLLECTIONS: u16 = 0x12;

/// Returns the conventional name of a feature code.
pub fn feature_name(code: u16) -> Option<&'static str> {
    Some(match code {
        DATATYPE => "DATATYPE",
        TLS => "TLS",
        TCP_NODELAY => "TCP_NODELAY",
        MUTATION_SEQNO => "MUTATION_SEQNO",
        TCP_DELAY => "TCP_DELAY",
        XATTR => "XATTR",
        XERROR => "XERROR",
        SELECT_BUCKET => "SELECT_BUCKET",
        SNAPPY => "SNAPPY",
        JSON => "JSON",
        DUPLEX => "DUPLEX",
        CLUSTERMAP_NOTIF => "CLUSTERMAP_NOTIF",
        UNORDERED_EXEC => "UNORDERED_EXEC",
        DURATIONS => "DURATIONS",
        ALT_REQUESTS => "ALT_REQUESTS",
        SYNC_REPLICATION => "SYNC_REPLICATION",
        COLLECTIONS => "COLLECTIONS",
        _ => return None,
    })
}

/// The set of features enabled on one connection.
///
/// Cheaply clonable; the reader and writer half of a connection share one
/// set. Enabling is idempotent.
#[derive(Debug, Clone, Default)]
pub struct FeatureSet {
    inner: Arc<RwLock<HashSet<u16>>>,
}

impl FeatureSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables a feature. Enabling an already-enabled feature is a no-op.
    pub fn enable(&self, code: u16) {
        self.inner.write().insert(code);
    }

    pub fn contains(&self, code: u16) -> bool {
        self.inner.read().contains(&code)
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// Returns the enabled codes in ascending order.
    pub fn snapshot(&self) -> Vec<u16> {
        let mut codes: Vec<u16> = self.inner.read().iter().copied().collect();
        codes.sort_unstable();
        codes
    }
}
