//! Per-connection pairing and packet routing.
//!
//! A pair owns the frontend socket, a freshly dialed backend socket, one
//! script engine, two bounded outbound queues, and a cancellation token.
//! Three tasks progress independently: the two readers pull packets off
//! their socket and route them through the script, and the writer drains
//! both queues onto the sockets.
//!
//! Routing is by origin: a packet read from one side is forwarded to the
//! opposite side unless a handler says otherwise; a handler's `forward`
//! goes opposite the origin and its `reply` back to the origin, regardless
//! of the packet's magic.

use crate::config::ProxyConfig;
use crate::error::ProxyError;
use crate::intercept;
use crate::logging;
use memdproxy_protocol::{command, MemdReader, MemdWriter, FeatureSet, Packet};
use memdproxy_script::{Dispatch, ScriptAction, ScriptEngine};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tokio::io::AsyncRead;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Which socket a packet was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Origin {
    Frontend,
    Backend,
}

impl Origin {
    fn opposite(self) -> Self {
        match self {
            Origin::Frontend => Origin::Backend,
            Origin::Backend => Origin::Frontend,
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Origin::Frontend => write!(f, "fe"),
            Origin::Backend => write!(f, "be"),
        }
    }
}

/// A packet queued for the writer, tagged with the script that produced it
/// (`None` when the proxy is merely forwarding).
#[derive(Debug)]
pub(crate) struct OutboundPacket {
    pub packet: Packet,
    pub script: Option<Arc<str>>,
}

/// One frontend connection paired with its backend connection.
pub(crate) struct ConnectionPair {
    cid: u64,
    config: ProxyConfig,
    engine: Arc<Mutex<ScriptEngine>>,
    cancel: CancellationToken,
}

impl ConnectionPair {
    pub(crate) fn new(
        cid: u64,
        config: ProxyConfig,
        engine: ScriptEngine,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            cid,
            config,
            engine: Arc::new(Mutex::new(engine)),
            cancel,
        }
    }

    /// Runs the pair to completion.
    ///
    /// Dials the backend, pumps packets in both directions, and tears
    /// everything down once either side goes away or cancellation is
    /// requested. Both sockets are closed on return.
    pub(crate) async fn run(self, fe_stream: TcpStream) -> Result<(), ProxyError> {
        let backend_addr = self.config.backend_addr();
        let be_stream = match TcpStream::connect(&backend_addr).await {
            Ok(stream) => stream,
            Err(source) => {
                return Err(ProxyError::BackendUnreachable {
                    addr: backend_addr,
                    source,
                })
            }
        };
        tracing::debug!(cid = self.cid, backend = %backend_addr, "backend dialed");

        let fe_features = FeatureSet::new();
        let be_features = FeatureSet::new();
        let (fe_read, fe_write) = fe_stream.into_split();
        let (be_read, be_write) = be_stream.into_split();
        let fe_reader = MemdReader::new(fe_read, fe_features.clone());
        let mut fe_writer = MemdWriter::new(fe_write, fe_features);
        let be_reader = MemdReader::new(be_read, be_features.clone());
        let mut be_writer = MemdWriter::new(be_write, be_features);

        let (to_be_tx, to_be_rx) = mpsc::channel(self.config.queue_capacity);
        let (to_fe_tx, to_fe_rx) = mpsc::channel(self.config.queue_capacity);

        let fe_task = tokio::spawn(reader_loop(
            self.cid,
            Origin::Frontend,
            fe_reader,
            self.engine.clone(),
            to_fe_tx.clone(),
            to_be_tx.clone(),
            self.cancel.clone(),
        ));
        let be_task = tokio::spawn(reader_loop(
            self.cid,
            Origin::Backend,
            be_reader,
            self.engine.clone(),
            to_fe_tx,
            to_be_tx,
            self.cancel.clone(),
        ));

        self.write_loop(&mut fe_writer, &mut be_writer, to_fe_rx, to_be_rx)
            .await;

        self.cancel.cancel();
        let _ = fe_task.await;
        let _ = be_task.await;
        Ok(())
    }

    /// Drains both outbound queues onto the sockets.
    ///
    /// An in-flight write always completes; cancellation is only observed
    /// between packets. HELO responses heading to the frontend pass through
    /// the feature-negotiation interceptor before they are written, so the
    /// next read on either socket already uses the negotiated framing.
    async fn write_loop(
        &self,
        fe_writer: &mut MemdWriter<OwnedWriteHalf>,
        be_writer: &mut MemdWriter<OwnedWriteHalf>,
        mut to_fe_rx: mpsc::Receiver<OutboundPacket>,
        mut to_be_rx: mpsc::Receiver<OutboundPacket>,
    ) {
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                out = to_be_rx.recv() => {
                    let Some(out) = out else { break };
                    logging::log_packet(self.cid, "fe->be", &out.packet, out.script.as_deref());
                    if let Err(e) = be_writer.write_packet(&out.packet).await {
                        tracing::warn!(cid = self.cid, error = %e, "backend write failed");
                        break;
                    }
                }
                out = to_fe_rx.recv() => {
                    let Some(out) = out else { break };
                    if out.packet.magic.is_response() && out.packet.opcode == command::HELO {
                        intercept::negotiate_features(
                            self.cid,
                            &out.packet,
                            fe_writer.features(),
                            be_writer.features(),
                        );
                    }
                    logging::log_packet(self.cid, "be->fe", &out.packet, out.script.as_deref());
                    if let Err(e) = fe_writer.write_packet(&out.packet).await {
                        tracing::warn!(cid = self.cid, error = %e, "frontend write failed");
                        break;
                    }
                }
            }
        }
        self.cancel.cancel();
    }
}

/// Reads packets off one socket and routes each through the script.
///
/// The engine lock is held only for the synchronous handler invocation;
/// the collected actions are flushed to the queues afterwards, so a full
/// queue back-pressures this reader without stalling the other one inside
/// the interpreter.
async fn reader_loop<R>(
    cid: u64,
    origin: Origin,
    mut reader: MemdReader<R>,
    engine: Arc<Mutex<ScriptEngine>>,
    to_fe_tx: mpsc::Sender<OutboundPacket>,
    to_be_tx: mpsc::Sender<OutboundPacket>,
    cancel: CancellationToken,
) where
    R: AsyncRead + Unpin + Send + 'static,
{
    let script_tag: Arc<str> = {
        let engine = engine.lock();
        engine.name_tag()
    };

    loop {
        let packet = tokio::select! {
            _ = cancel.cancelled() => break,
            result = reader.read_packet() => match result {
                Ok(packet) => packet,
                Err(e) if e.is_clean_close() => {
                    tracing::info!(cid, side = %origin, "peer closed connection");
                    cancel.cancel();
                    break;
                }
                Err(e) if e.is_disconnect() => {
                    tracing::warn!(cid, side = %origin, error = %e, "connection lost");
                    cancel.cancel();
                    break;
                }
                Err(e) => {
                    tracing::warn!(cid, side = %origin, error = %e, "read failed");
                    cancel.cancel();
                    break;
                }
            }
        };

        let dispatch = {
            let engine = engine.lock();
            engine.dispatch(&packet)
        };

        match dispatch {
            Dispatch::NoHandler => {
                let out = OutboundPacket {
                    packet,
                    script: None,
                };
                let tx = sender_for(origin.opposite(), &to_fe_tx, &to_be_tx);
                if !enqueue(cid, &cancel, tx, out).await {
                    break;
                }
            }
            Dispatch::Handled(invocation) => {
                if let Some(error) = invocation.error {
                    tracing::warn!(cid, side = %origin, error = %error, "script evaluation error");
                }
                let mut closing = false;
                for action in invocation.actions {
                    let (destination, packet) = match action {
                        ScriptAction::Forward(p) => (origin.opposite(), p),
                        ScriptAction::Reply(p) => (origin, p),
                    };
                    let out = OutboundPacket {
                        packet,
                        script: Some(script_tag.clone()),
                    };
                    let tx = sender_for(destination, &to_fe_tx, &to_be_tx);
                    if !enqueue(cid, &cancel, tx, out).await {
                        closing = true;
                        break;
                    }
                }
                if closing {
                    break;
                }
            }
        }
    }
}

fn sender_for<'a>(
    destination: Origin,
    to_fe_tx: &'a mpsc::Sender<OutboundPacket>,
    to_be_tx: &'a mpsc::Sender<OutboundPacket>,
) -> &'a mpsc::Sender<OutboundPacket> {
    match destination {
        Origin::Frontend => to_fe_tx,
        Origin::Backend => to_be_tx,
    }
}

/// Sends one packet onto a queue, racing cancellation.
///
/// Returns `false` when the pair is shutting down (the packet is logged as
/// dropped) or the writer is gone.
async fn enqueue(
    cid: u64,
    cancel: &CancellationToken,
    tx: &mpsc::Sender<OutboundPacket>,
    out: OutboundPacket,
) -> bool {
    let opcode = out.packet.opcode;
    tokio::select! {
        _ = cancel.cancelled() => {
            tracing::warn!(
                cid,
                opcode = %format_args!("{opcode:#04x}"),
                "packet dropped, connection closing"
            );
            false
        }
        result = tx.send(out) => result.is_ok(),
    }
}
