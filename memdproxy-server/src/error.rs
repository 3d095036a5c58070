//! Proxy error types.

use thiserror::Error;

/// Proxy errors.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] memdproxy_protocol::ProtocolError),

    #[error("script error: {0}")]
    Script(#[from] memdproxy_script::ScriptError),

    /// The initial backend dial failed; fatal for the pair only.
    #[error("backend {addr} unreachable: {source}")]
    BackendUnreachable {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}
