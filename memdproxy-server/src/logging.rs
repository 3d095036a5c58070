//! Per-packet logging.
//!
//! Debug level logs the routing metadata; trace level adds key, extras, and
//! value, rendered as UTF-8 when valid and hex otherwise.

use memdproxy_protocol::{command, Packet};
use tracing::Level;

pub(crate) fn log_packet(cid: u64, direction: &'static str, packet: &Packet, script: Option<&str>) {
    let cmd = packet.command_name().unwrap_or("UNKNOWN");
    let script = script.unwrap_or("");
    let trace = tracing::enabled!(Level::TRACE);
    match (trace, packet.magic.is_response()) {
        (false, false) => {
            tracing::debug!(
                cid,
                direction,
                opaque = %format_args!("{:#x}", packet.opaque),
                magic = %packet.magic,
                opcode = %format_args!("{:#04x}", packet.opcode),
                command = cmd,
                script,
                "packet"
            );
        }
        (false, true) => {
            tracing::debug!(
                cid,
                direction,
                opaque = %format_args!("{:#x}", packet.opaque),
                magic = %packet.magic,
                opcode = %format_args!("{:#04x}", packet.opcode),
                command = cmd,
                status = %status_label(packet.status),
                script,
                "packet"
            );
        }
        (true, false) => {
            tracing::trace!(
                cid,
                direction,
                opaque = %format_args!("{:#x}", packet.opaque),
                magic = %packet.magic,
                opcode = %format_args!("{:#04x}", packet.opcode),
                command = cmd,
                script,
                key = %printable(&packet.key),
                extras = %printable(&packet.extras),
                value = %printable(&packet.value),
                "packet"
            );
        }
        (true, true) => {
            tracing::trace!(
                cid,
                direction,
                opaque = %format_args!("{:#x}", packet.opaque),
                magic = %packet.magic,
                opcode = %format_args!("{:#04x}", packet.opcode),
                command = cmd,
                status = %status_label(packet.status),
                script,
                key = %printable(&packet.key),
                extras = %printable(&packet.extras),
                value = %printable(&packet.value),
                "packet"
            );
        }
    }
}

fn status_label(status: u16) -> String {
    command::status_name(status)
        .map(str::to_string)
        .unwrap_or_else(|| format!("{status:#06x}"))
}

fn printable(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => bytes.iter().map(|b| format!("{b:02x}")).collect(),
    }
}
