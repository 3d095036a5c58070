//! HELO feature negotiation.
//!
//! The HELO response value is the list of accepted features as big-endian
//! 16-bit codes. The writer calls [`negotiate_features`] before handing a
//! HELO response to the frontend so that both codecs frame every subsequent
//! packet with the negotiated features. The frontend and backend sets of a
//! pair must stay identical, so each code is enabled on both.

use memdproxy_protocol::{feature_name, FeatureSet, Packet};

/// Enables every feature advertised by a HELO response on both sides.
///
/// Never fails: a malformed value (odd length) is logged and the packet is
/// forwarded as-is, with the complete pairs still applied.
pub(crate) fn negotiate_features(
    cid: u64,
    packet: &Packet,
    fe_features: &FeatureSet,
    be_features: &FeatureSet,
) {
    let value = &packet.value;
    if value.len() % 2 != 0 {
        tracing::warn!(
            cid,
            len = value.len(),
            "HELO response value has odd length, trailing byte ignored"
        );
    }
    for chunk in value.chunks_exact(2) {
        let code = u16::from_be_bytes([chunk[0], chunk[1]]);
        fe_features.enable(code);
        be_features.enable(code);
        tracing::debug!(
            cid,
            feature = %format_args!("{code:#06x}"),
            name = feature_name(code).unwrap_or("unknown"),
            "feature enabled on both sides"
        );
    }
}
